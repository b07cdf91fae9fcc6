use std::net::SocketAddr;

use crate::domain::{SessionInfo, TunnelError};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for tracking tunnels and the failures the client never hears about
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a freshly established tunnel
    async fn track_session(&self, info: SessionInfo);

    /// Mark a tunnel as closed with its byte counters
    async fn close_session(&self, id: Uuid, client_to_upstream: u64, upstream_to_client: u64);

    /// Get all tunnels that are still relaying
    async fn active_sessions(&self) -> Vec<SessionInfo>;

    /// Sink for every error that is swallowed on the wire.
    fn record_failure(&self, client: SocketAddr, error: &TunnelError);
}
