use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use connect_proxy::adapters::{ConnectionTracker, TcpConnector, TcpProxyListener};
use connect_proxy::domain::{SessionSettings, TunnelService};
use connect_proxy::ports::UpstreamConnector;

pub const TEST_AGENT: &str = "connect-proxy-test";

pub struct TestProxyServer {
    addr: SocketAddr,
    tracker: Arc<ConnectionTracker>,
    server_handle: JoinHandle<()>,
}

impl TestProxyServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with(Arc::new(TcpConnector::new(Some(Duration::from_secs(5))))).await
    }

    pub async fn start_with(connector: Arc<dyn UpstreamConnector>) -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_configured(connector, None).await
    }

    /// A proxy that serves at most `max_sessions` clients at a time.
    pub async fn start_limited(max_sessions: usize) -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_configured(
            Arc::new(TcpConnector::new(Some(Duration::from_secs(5)))),
            Some(max_sessions),
        )
        .await
    }

    pub async fn start_configured(
        connector: Arc<dyn UpstreamConnector>,
        max_sessions: Option<usize>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let tracker = Arc::new(ConnectionTracker::new());
        let service = TunnelService::new(
            connector,
            tracker.clone(),
            SessionSettings {
                proxy_agent: TEST_AGENT.to_string(),
                sibling_wait: Duration::from_secs(1),
            },
        );

        let listener = TcpProxyListener::bind("127.0.0.1", 0, service, max_sessions)?;
        let addr = listener.local_addr()?;
        let server_handle = tokio::spawn(listener.run());

        Ok(Self {
            addr,
            tracker,
            server_handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Opens a client connection and sends `request` as the first chunk.
    pub async fn send(&self, request: &[u8]) -> TcpStream {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .expect("Should be able to connect to the proxy");
        stream
            .write_all(request)
            .await
            .expect("Should be able to write the request");
        stream
    }

    pub fn established_reply() -> Vec<u8> {
        format!(
            "HTTP/1.1 200 Connection Established\r\nProxy-Agent: {}\r\n\r\n",
            TEST_AGENT
        )
        .into_bytes()
    }
}

impl Drop for TestProxyServer {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}
