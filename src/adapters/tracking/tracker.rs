use crate::domain::{SessionInfo, TunnelError};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

/// Closed sessions stay listed this long before being purged.
pub const CLOSED_RETENTION: Duration = Duration::from_secs(4);
const CLEANUP_INTERVAL: Duration = Duration::from_millis(250);

/// In-memory session tracker
pub struct ConnectionTracker {
    sessions: Arc<RwLock<Vec<SessionInfo>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            let mut ticker = interval(CLEANUP_INTERVAL);

            loop {
                ticker.tick().await;
                purge_closed(&sessions, Instant::now()).await;
            }
        })
    }

    #[cfg(test)]
    async fn purge(&self, now: Instant) {
        purge_closed(&self.sessions, now).await;
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

async fn purge_closed(sessions: &RwLock<Vec<SessionInfo>>, now: Instant) {
    sessions.write().await.retain(|session| match session.closed_at {
        Some(closed_at) => now.saturating_duration_since(closed_at) < CLOSED_RETENTION,
        None => true,
    });
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for ConnectionTracker {
    async fn track_session(&self, info: SessionInfo) {
        info!("Tunnel established: {} -> {}", info.client.ip(), info.target);

        let mut sessions = self.sessions.write().await;
        sessions.push(info);
    }

    async fn close_session(&self, id: Uuid, client_to_upstream: u64, upstream_to_client: u64) {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.iter_mut().find(|s| s.id == id) {
            session.close(client_to_upstream, upstream_to_client);
            debug!(
                "Tunnel closed: {} -> {} (sent={} received={} after {:?})",
                session.client.ip(),
                session.target,
                client_to_upstream,
                upstream_to_client,
                session.opened_at.elapsed()
            );
        }
    }

    async fn active_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.iter().filter(|s| s.is_open()).cloned().collect()
    }

    fn record_failure(&self, client: SocketAddr, error: &TunnelError) {
        debug!(%client, "session ended: {}", error);
    }
}
