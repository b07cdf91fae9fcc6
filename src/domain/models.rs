use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use super::errors::{Result, TunnelError};

pub const CONNECT_METHOD: &str = "CONNECT";
pub const DEFAULT_CONNECT_PORT: u16 = 443;
pub const DEFAULT_PROXY_AGENT: &str = "connect-proxy";

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Fixed status lines sent to the client. Nothing else is ever written by the
/// proxy itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Established { agent: String },
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
}

impl Reply {
    pub fn established<T: Into<String>>(agent: T) -> Self {
        Reply::Established { agent: agent.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Reply::Established { agent } => format!(
                "HTTP/1.1 200 Connection Established\r\nProxy-Agent: {}\r\n\r\n",
                agent
            )
            .into_bytes(),
            Reply::NotImplemented => b"HTTP/1.1 501 Not Implemented\r\n\r\n".to_vec(),
            Reply::BadGateway => b"HTTP/1.1 502 Bad Gateway\r\n\r\n".to_vec(),
            Reply::ServiceUnavailable => b"HTTP/1.1 503 Service Unavailable\r\n\r\n".to_vec(),
        }
    }
}

/// Destination named by a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
}

impl ConnectTarget {
    pub fn new<T: Into<String>>(host: T, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`, bare `host`, or a bracketed IPv6 literal with an
    /// optional port. The port is taken after the last colon.
    pub fn parse(authority: &str) -> Result<Self> {
        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TunnelError::MalformedTarget(format!("unclosed bracket in {:?}", authority)))?;
            let port = match tail {
                "" => DEFAULT_CONNECT_PORT,
                tail => match tail.strip_prefix(':') {
                    Some(port) => parse_port(authority, port)?,
                    None => {
                        return Err(TunnelError::MalformedTarget(format!(
                            "unexpected text after address in {:?}",
                            authority
                        )))
                    }
                },
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(authority, port)?),
                None => (authority, DEFAULT_CONNECT_PORT),
            }
        };

        if host.is_empty() {
            return Err(TunnelError::MalformedTarget(format!("empty host in {:?}", authority)));
        }
        Ok(Self::new(host, port))
    }
}

fn parse_port(authority: &str, port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| TunnelError::MalformedTarget(format!("invalid port in {:?}", authority)))
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A parsed CONNECT request, taken from the first chunk a client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub target: ConnectTarget,
    /// Bytes the client sent after the end of the request header, if the
    /// header terminator was part of the first chunk.
    pub pipelined: Vec<u8>,
}

impl ConnectRequest {
    pub fn parse(chunk: &[u8]) -> Result<Self> {
        if chunk.is_empty() {
            return Err(TunnelError::EmptyRequest);
        }

        let line = request_line(chunk);
        if !line.starts_with(CONNECT_METHOD) {
            return Err(TunnelError::UnsupportedMethod(line));
        }

        let target = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| TunnelError::MalformedTarget(format!("no target in {:?}", line)))?;

        Ok(Self {
            target: ConnectTarget::parse(target)?,
            pipelined: pipelined_bytes(chunk).to_vec(),
        })
    }
}

/// First line of the chunk, decoded one char per byte and trimmed.
pub fn request_line(chunk: &[u8]) -> String {
    let text: String = chunk.iter().map(|&b| char::from(b)).collect();
    text.split('\n').next().unwrap_or_default().trim().to_string()
}

fn pipelined_bytes(chunk: &[u8]) -> &[u8] {
    chunk
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| &chunk[pos + HEADER_TERMINATOR.len()..])
        .unwrap_or(&[])
}

/// Lifecycle of a tracked tunnel. Requests that never reach the relay are
/// not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Relaying,
    Closed,
}

/// Bookkeeping for one established tunnel.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: uuid::Uuid,
    pub client: SocketAddr,
    pub target: ConnectTarget,
    pub state: SessionState,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

impl SessionInfo {
    pub fn new(client: SocketAddr, target: ConnectTarget) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            client,
            target,
            state: SessionState::Relaying,
            opened_at: Instant::now(),
            closed_at: None,
            client_to_upstream: 0,
            upstream_to_client: 0,
        }
    }

    pub fn close(&mut self, client_to_upstream: u64, upstream_to_client: u64) {
        self.state = SessionState::Closed;
        self.closed_at = Some(Instant::now());
        self.client_to_upstream = client_to_upstream;
        self.upstream_to_client = upstream_to_client;
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}
