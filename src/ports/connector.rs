use crate::domain::{ConnectTarget, Result};
use async_trait::async_trait;
use tokio::net::TcpStream;

/// Port for opening the upstream side of a tunnel
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Resolve `target` and open a TCP connection to it.
    ///
    /// Implementations must report lookup failures as
    /// [`TunnelError::Resolution`](crate::domain::TunnelError::Resolution) and an
    /// actively refused connection as
    /// [`TunnelError::Refused`](crate::domain::TunnelError::Refused), since those
    /// two decide what the client is told.
    async fn connect(&self, target: &ConnectTarget) -> Result<TcpStream>;
}
