use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::warn;

use crate::domain::TunnelService;

pub const LISTEN_BACKLOG: i32 = 5;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Startup failures. These are the only fatal errors of the proxy.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Accept loop handing each client to its own task.
pub struct TcpProxyListener {
    listener: TcpListener,
    service: Arc<TunnelService>,
    session_limit: Option<Arc<Semaphore>>,
}

impl TcpProxyListener {
    /// Binds `host:port` with `SO_REUSEADDR` and a fixed backlog.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        host: &str,
        port: u16,
        service: TunnelService,
        max_sessions: Option<usize>,
    ) -> Result<Self, ListenerError> {
        let addr = (host, port)
            .to_socket_addrs()
            .and_then(|mut addrs| {
                addrs
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"))
            })
            .map_err(|source| ListenerError::InvalidAddress {
                addr: format!("{}:{}", host, port),
                source,
            })?;

        let listener = listen(addr).map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            service: Arc::new(service),
            session_limit: max_sessions.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts forever. Accept errors are logged and retried after a short
    /// pause; they never end the loop.
    pub async fn run(self) {
        loop {
            let permit = match &self.session_limit {
                Some(limit) => limit.clone().acquire_owned().await.ok(),
                None => None,
            };

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        service.handle(stream, peer).await;
                    });
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    TcpListener::from_std(socket.into())
}
