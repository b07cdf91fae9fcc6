pub mod connector;
pub mod tracking;

pub use connector::UpstreamConnector;
pub use tracking::TrackingPort;
