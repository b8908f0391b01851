use std::{env, error::Error, fmt, io, str::FromStr, time::Duration};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A malformed environment variable.
#[derive(Debug)]
pub struct ConfigErr {
    var: &'static str,
    value: String,
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.var, self.value)
    }
}

impl Error for ConfigErr {}

/// Boundary conversion for the binary.
impl From<ConfigErr> for io::Error {
    fn from(value: ConfigErr) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}

/// Polling cadence of the streams.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Used when a metrics request asks for a zero interval.
    pub metrics_poll_interval: Duration,
    pub image_poll_interval: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            metrics_poll_interval: DEFAULT_POLL_INTERVAL,
            image_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Everything the producer process needs to start serving.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_retries: u32,
    pub streaming: StreamingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_retries: DEFAULT_MAX_RETRIES,
            streaming: StreamingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `HOST`, `PORT`, `MAX_RETRIES` and `IMAGE_POLL_MS`, falling back to the defaults.
    pub fn from_env() -> Result<Self, ConfigErr> {
        let defaults = Self::default();

        let image_poll_ms = parse_var(
            "IMAGE_POLL_MS",
            defaults.streaming.image_poll_interval.as_millis() as u64,
        )?;

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port)?,
            max_retries: parse_var("MAX_RETRIES", defaults.max_retries)?,
            streaming: StreamingConfig {
                image_poll_interval: Duration::from_millis(image_poll_ms),
                ..defaults.streaming
            },
        })
    }

    /// The `host:port` pair to bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigErr> {
    match env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigErr { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:50051");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.streaming.image_poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigErr {
            var: "PORT",
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for PORT: \"abc\"");
    }
}
