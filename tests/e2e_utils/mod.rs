#![allow(dead_code)]
#![allow(unused_imports)]

pub mod proxy_server;
pub mod upstream;

pub use proxy_server::TestProxyServer;
pub use upstream::{closed_port, read_exactly, read_reply, Blackhole, Upstream};
