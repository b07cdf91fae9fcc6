use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use super::relay::{relay, PipeOutcome, DEFAULT_SIBLING_WAIT};
use super::{ConnectRequest, Reply, Result, SessionInfo, TunnelError, DEFAULT_PROXY_AGENT};
use crate::ports::{TrackingPort, UpstreamConnector};

/// Upper bound of the first read from a client.
pub const REQUEST_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Value of the `Proxy-Agent` header in the 200 reply.
    pub proxy_agent: String,
    /// How long to wait for the upstream-to-client pipe once the session ends.
    pub sibling_wait: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            proxy_agent: DEFAULT_PROXY_AGENT.to_string(),
            sibling_wait: DEFAULT_SIBLING_WAIT,
        }
    }
}

/// Drives one client connection from the CONNECT line to socket closure.
#[derive(Clone)]
pub struct TunnelService {
    connector: Arc<dyn UpstreamConnector>,
    tracker: Arc<dyn TrackingPort>,
    settings: SessionSettings,
}

impl TunnelService {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        tracker: Arc<dyn TrackingPort>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connector,
            tracker,
            settings,
        }
    }

    /// Serves `client` until the tunnel ends or the request is turned down.
    ///
    /// Never fails: every error either becomes one of the fixed replies or is
    /// handed to the tracker. Both sockets are dropped before this returns.
    pub async fn handle<C>(&self, mut client: C, peer: SocketAddr)
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        trace!(%peer, "awaiting request");

        let (request, mut upstream) = match self.open_upstream(&mut client).await {
            Ok(opened) => opened,
            Err(err) => {
                self.reject(&mut client, peer, err).await;
                return;
            }
        };

        let info = SessionInfo::new(peer, request.target.clone());
        let id = info.id;
        self.tracker.track_session(info).await;

        if let Err(err) = self.handshake(&mut client, &mut upstream, &request).await {
            self.tracker.record_failure(peer, &err);
            self.tracker.close_session(id, 0, 0).await;
            return;
        }

        let summary = relay(client, upstream, self.settings.sibling_wait).await;
        let (client_to_upstream, upstream_to_client) = summary.bytes();

        self.record_pipe_error(peer, "client to upstream relay", summary.client_to_upstream);
        if let Some(outcome) = summary.upstream_to_client {
            self.record_pipe_error(peer, "upstream to client relay", outcome);
        }

        self.tracker
            .close_session(
                id,
                client_to_upstream + request.pipelined.len() as u64,
                upstream_to_client,
            )
            .await;
    }

    async fn open_upstream<C>(&self, client: &mut C) -> Result<(ConnectRequest, TcpStream)>
    where
        C: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; REQUEST_CHUNK_SIZE];
        let n = client
            .read(&mut chunk)
            .await
            .map_err(|e| TunnelError::io("request read", e))?;

        let request = ConnectRequest::parse(&chunk[..n])?;
        trace!(destination = %request.target, "request parsed");

        let upstream = self.connector.connect(&request.target).await?;
        Ok((request, upstream))
    }

    async fn handshake<C>(&self, client: &mut C, upstream: &mut TcpStream, request: &ConnectRequest) -> Result<()>
    where
        C: AsyncWrite + Unpin,
    {
        client
            .write_all(&Reply::established(self.settings.proxy_agent.as_str()).to_bytes())
            .await
            .map_err(|e| TunnelError::io("handshake", e))?;

        if !request.pipelined.is_empty() {
            upstream
                .write_all(&request.pipelined)
                .await
                .map_err(|e| TunnelError::io("pipelined write", e))?;
        }
        Ok(())
    }

    async fn reject<C>(&self, client: &mut C, peer: SocketAddr, err: TunnelError)
    where
        C: AsyncWrite + Unpin,
    {
        if let Some(reply) = err.reply() {
            trace!(%peer, "rejecting request");
            if let Err(e) = client.write_all(&reply.to_bytes()).await {
                self.tracker.record_failure(peer, &TunnelError::io("reply", e));
            }
        }
        self.tracker.record_failure(peer, &err);
    }

    fn record_pipe_error(&self, peer: SocketAddr, stage: &'static str, outcome: PipeOutcome) {
        if let Some(e) = outcome.into_error() {
            self.tracker.record_failure(peer, &TunnelError::io(stage, e));
        }
    }
}
