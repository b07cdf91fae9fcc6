pub mod tcp;
pub mod tracking;

pub use tcp::{ListenerError, TcpConnector, TcpProxyListener};
pub use tracking::*;
