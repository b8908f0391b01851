pub mod backoff;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod performance;
pub mod rpc;
pub mod state;

pub use backoff::BackoffPolicy;
pub use config::{ClientConfig, StreamConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use consumer::{Connection, StreamConsumer};
pub use error::{ClientErr, Result};
pub use performance::Performance;
pub use rpc::{HealthApi, RpcClient, Subscription};
pub use state::DashboardState;
