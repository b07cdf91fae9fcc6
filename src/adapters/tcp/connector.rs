use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::domain::{ConnectTarget, Result, TunnelError};
use crate::ports::UpstreamConnector;

/// Direct TCP dialer: resolves the target and tries each address in turn.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    /// `connect_timeout` bounds the whole dial, all addresses included. `None`
    /// waits for the operating system to give up.
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }

    async fn resolve(target: &ConnectTarget) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|source| TunnelError::Resolution {
                host: target.host.clone(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TunnelError::Resolution {
                host: target.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            });
        }
        Ok(addrs)
    }
}

async fn dial_any(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to dial")))
}

fn classify(target: &ConnectTarget, err: io::Error) -> TunnelError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => TunnelError::Refused {
            target: target.to_string(),
        },
        _ => TunnelError::io("connect", err),
    }
}

#[async_trait]
impl UpstreamConnector for TcpConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<TcpStream> {
        let addrs = Self::resolve(target).await?;

        with_deadline(self.connect_timeout, target, dial_any(&addrs)).await
    }
}

/// Runs `dial`, giving up with `ConnectTimeout` once `limit` elapses.
async fn with_deadline<F>(limit: Option<Duration>, target: &ConnectTarget, dial: F) -> Result<TcpStream>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let dialed = match limit {
        Some(limit) => timeout(limit, dial)
            .await
            .map_err(|_| TunnelError::ConnectTimeout {
                target: target.to_string(),
            })?,
        None => dial.await,
    };

    dialed.map_err(|e| classify(target, e))
}
