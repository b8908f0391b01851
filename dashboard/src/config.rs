use std::{env, str::FromStr, time::Duration};

use crate::{
    backoff::BackoffPolicy,
    error::ClientErr,
    performance::{DEFAULT_FPS_WINDOW, DEFAULT_STATUS_EVERY},
    state::DEFAULT_HISTORY_LEN,
};

pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:50051";
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 100;
pub const DEFAULT_IMAGE_BATCH_SIZE: u32 = 16;

/// How the consumer drives its streams.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub metrics_interval_ms: u64,
    pub image_batch_size: u32,
    pub heartbeat_interval: Duration,
    pub fps_window: usize,
    /// A status report is pushed every this many rendered frames.
    pub status_every: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: DEFAULT_METRICS_INTERVAL_MS,
            image_batch_size: DEFAULT_IMAGE_BATCH_SIZE,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            fps_window: DEFAULT_FPS_WINDOW,
            status_every: DEFAULT_STATUS_EVERY,
        }
    }
}

/// Everything the dashboard process needs to follow a producer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub client_id: String,
    pub backoff: BackoffPolicy,
    pub stream: StreamConfig,
    pub history_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDRESS.to_string(),
            client_id: random_client_id(),
            backoff: BackoffPolicy::default(),
            stream: StreamConfig::default(),
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

impl ClientConfig {
    /// Reads `SERVER_ADDRESS`, `CLIENT_ID`, `HEARTBEAT_MS` and `METRICS_INTERVAL_MS`,
    /// falling back to the defaults.
    pub fn from_env() -> Result<Self, ClientErr> {
        let defaults = Self::default();

        let heartbeat_ms = parse_var(
            "HEARTBEAT_MS",
            defaults.stream.heartbeat_interval.as_millis() as u64,
        )?;
        if heartbeat_ms == 0 {
            return Err(ClientErr::InvalidConfig {
                var: "HEARTBEAT_MS",
                value: heartbeat_ms.to_string(),
            });
        }

        Ok(Self {
            server_addr: env::var("SERVER_ADDRESS").unwrap_or(defaults.server_addr),
            client_id: env::var("CLIENT_ID").unwrap_or(defaults.client_id),
            stream: StreamConfig {
                heartbeat_interval: Duration::from_millis(heartbeat_ms),
                metrics_interval_ms: parse_var(
                    "METRICS_INTERVAL_MS",
                    defaults.stream.metrics_interval_ms,
                )?,
                ..defaults.stream
            },
            ..defaults
        })
    }
}

/// A random 128 bit identity, hex encoded.
pub fn random_client_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ClientErr> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ClientErr::InvalidConfig { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();

        assert_eq!(config.server_addr, "localhost:50051");
        assert_eq!(config.stream.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.stream.image_batch_size, 16);
        assert_eq!(config.backoff.max_retries, 5);
        assert_eq!(config.history_len, 100);
    }

    #[test]
    fn test_client_ids_are_random_hex() {
        let a = random_client_id();
        let b = random_client_id();

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
