mod connector;
mod listener;

pub use connector::TcpConnector;
pub use listener::{ListenerError, TcpProxyListener, LISTEN_BACKLOG};
