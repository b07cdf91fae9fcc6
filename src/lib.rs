pub mod adapters;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;

use std::sync::Arc;

use adapters::{ConnectionTracker, ListenerError, TcpConnector, TcpProxyListener};
use config::ProxyConfig;
use domain::TunnelService;

/// Wires the TCP connector and the session tracker into a bound listener.
///
/// Also starts the tracker's cleanup task, so this needs a running runtime.
pub fn bind(config: &ProxyConfig) -> Result<TcpProxyListener, ListenerError> {
    let tracker = Arc::new(ConnectionTracker::new());
    tracker.start_cleanup();

    let connector = Arc::new(TcpConnector::new(config.connect_timeout));
    let service = TunnelService::new(connector, tracker, config.session.clone());

    TcpProxyListener::bind(&config.host, config.port, service, config.max_sessions)
}
