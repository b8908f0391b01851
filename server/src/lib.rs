pub mod config;
pub mod health;
pub mod mock;
pub mod registry;
pub mod service;
pub mod source;
pub mod streaming;

pub use config::ServerConfig;
pub use health::HealthService;
pub use mock::{MockConfig, MockTrainer};
pub use registry::SessionRegistry;
pub use service::TrainingServer;
pub use source::TelemetrySource;
pub use streaming::StreamingService;
