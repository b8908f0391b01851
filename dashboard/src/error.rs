use std::{error::Error, fmt, io};

/// The dashboard module's result type.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Dashboard runtime failures.
#[derive(Debug)]
pub enum ClientErr {
    Io(io::Error),
    /// The producer answered the handshake but reported itself not alive.
    NotAlive,
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },
    /// The producer answered with an error frame.
    Remote(String),
    /// A reconnection campaign ran out of attempts, the caller must stop retrying.
    MaxRetriesExceeded {
        attempts: u32,
    },
    InvalidConfig {
        var: &'static str,
        value: String,
    },
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErr::Io(e) => write!(f, "io error: {e}"),
            ClientErr::NotAlive => write!(f, "the server reported itself as not alive"),
            ClientErr::UnexpectedResponse { expected, got } => {
                write!(f, "unexpected response: expected {expected}, got {got}")
            }
            ClientErr::Remote(text) => write!(f, "server error: {text}"),
            ClientErr::MaxRetriesExceeded { attempts } => {
                write!(f, "gave up reconnecting after {attempts} attempts")
            }
            ClientErr::InvalidConfig { var, value } => {
                write!(f, "invalid value for {var}: {value:?}")
            }
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
