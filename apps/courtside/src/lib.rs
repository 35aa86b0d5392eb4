pub mod api;
pub mod cache;
pub mod config;
pub mod connection;
pub mod metrics;
pub mod model;
pub mod notices;
pub mod optimistic;
pub mod poller;
pub mod protocol;
pub mod router;
pub mod session;
pub mod status;
pub mod subscription;
pub mod telemetry;
pub mod transport;

pub use session::{SessionError, SessionOptions, SyncSession};
