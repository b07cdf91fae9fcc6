use std::process;

use clap::Parser;
use tracing::{debug, error, info, warn};

use connect_proxy::config::{Opts, ProxyConfig};
use connect_proxy::logging;

/// Each tunnel holds two sockets, so the default soft limit runs out early.
#[cfg(unix)]
fn raise_nofile_limit() {
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => debug!("open file limit set to {}", limit),
        Err(e) => warn!("failed to raise open file limit: {}", e),
    }
}

#[cfg(not(unix))]
fn raise_nofile_limit() {}

async fn serve(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let listener = connect_proxy::bind(&config)?;
    let addr = listener.local_addr()?;

    info!("Proxy server running on http://{}:{}", config.host, addr.port());

    tokio::select! {
        _ = listener.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down server...");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    if let Err(e) = logging::init() {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
    raise_nofile_limit();

    if let Err(e) = serve(ProxyConfig::from(opts)).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
