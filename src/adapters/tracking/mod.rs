mod tracker;

pub use tracker::{ConnectionTracker, CLOSED_RETENTION};
