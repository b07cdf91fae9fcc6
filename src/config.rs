use std::time::Duration;

use clap::Parser;

use crate::domain::{SessionSettings, DEFAULT_PROXY_AGENT};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3007;

#[derive(Parser, Debug, Clone)]
#[clap(
    version = env!("CONNECT_PROXY_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Forward proxy that only speaks HTTP CONNECT"
)]
pub struct Opts {
    /// listen on this network address
    #[clap(long, env = "PROXY_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// listen on this port
    #[clap(long, short = 'p', env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Proxy-Agent header sent when a tunnel is established
    #[clap(long, env = "PROXY_AGENT", default_value = DEFAULT_PROXY_AGENT)]
    pub proxy_agent: String,

    /// Give up on an upstream connect after this many milliseconds
    #[clap(long, env = "CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Cap on concurrent sessions; unbounded when unset or 0
    #[clap(long, env = "MAX_SESSIONS")]
    pub max_sessions: Option<usize>,

    /// How long a closing session waits for its upstream-to-client pipe
    #[clap(long, env = "SIBLING_WAIT_MS", default_value_t = 1000)]
    pub sibling_wait_ms: u64,
}

/// Runtime settings of the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Option<Duration>,
    pub max_sessions: Option<usize>,
    pub session: SessionSettings,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            max_sessions: None,
            session: SessionSettings::default(),
        }
    }
}

impl From<Opts> for ProxyConfig {
    fn from(opts: Opts) -> Self {
        Self {
            host: opts.host,
            port: opts.port,
            connect_timeout: opts.connect_timeout_ms.map(Duration::from_millis),
            max_sessions: opts.max_sessions.filter(|&n| n > 0),
            session: SessionSettings {
                proxy_agent: opts.proxy_agent,
                sibling_wait: Duration::from_millis(opts.sibling_wait_ms),
            },
        }
    }
}
