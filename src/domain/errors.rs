use std::io;

use thiserror::Error;

use super::models::Reply;

/// Everything that can end a session before or during the tunnel.
///
/// Only resolution and refusal failures, plus a non-CONNECT request, are ever
/// shown to the client. Everything else closes the connection silently.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("peer closed the connection before sending a request")]
    EmptyRequest,
    #[error("unsupported request line: {0:?}")]
    UnsupportedMethod(String),
    #[error("malformed CONNECT target: {0}")]
    MalformedTarget(String),
    #[error("failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to {target} refused")]
    Refused { target: String },
    #[error("connection to {target} timed out")]
    ConnectTimeout { target: String },
    #[error("{stage} failed: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TunnelError {
    pub fn io(stage: &'static str, source: io::Error) -> Self {
        TunnelError::Io { stage, source }
    }

    /// The status line owed to the client for this failure, if any.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            TunnelError::UnsupportedMethod(_) => Some(Reply::NotImplemented),
            TunnelError::Resolution { .. } => Some(Reply::BadGateway),
            TunnelError::Refused { .. } => Some(Reply::ServiceUnavailable),
            TunnelError::EmptyRequest
            | TunnelError::MalformedTarget(_)
            | TunnelError::ConnectTimeout { .. }
            | TunnelError::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_three_failures_are_visible_to_the_client() {
        assert_eq!(
            TunnelError::UnsupportedMethod("GET / HTTP/1.1".into()).reply(),
            Some(Reply::NotImplemented)
        );
        assert_eq!(
            TunnelError::Resolution {
                host: "nowhere.invalid".into(),
                source: io::Error::new(io::ErrorKind::Other, "no such host"),
            }
            .reply(),
            Some(Reply::BadGateway)
        );
        assert_eq!(
            TunnelError::Refused { target: "127.0.0.1:1".into() }.reply(),
            Some(Reply::ServiceUnavailable)
        );

        assert!(TunnelError::EmptyRequest.reply().is_none());
        assert!(TunnelError::MalformedTarget("host:abc".into()).reply().is_none());
        assert!(TunnelError::ConnectTimeout { target: "10.0.0.1:443".into() }
            .reply()
            .is_none());
        assert!(
            TunnelError::io("connect", io::Error::from(io::ErrorKind::ConnectionReset))
                .reply()
                .is_none()
        );
    }

    #[test]
    fn display_names_the_failing_stage() {
        let err = TunnelError::io("handshake", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.to_string().starts_with("handshake failed"));
    }
}
