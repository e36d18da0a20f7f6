//! Client for the Mikrotik RouterOS binary API (TCP, default port 8728).

pub mod codec;
pub mod session;

use thiserror::Error;

pub use codec::{Record, Sentence, SentenceCodec, is_error, parse_records};
pub use session::{ApiSession, ConnectOptions, challenge_response};

pub const DEFAULT_API_PORT: u16 = 8728;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out during {0}")]
    Timeout(&'static str),
    #[error("Connection closed by device")]
    ConnectionClosed,
    #[error("Login failed: {0}")]
    LoginFailed(String),
    #[error("Malformed word: {0}")]
    MalformedWord(String),
    #[error("Device rejected command: {0}")]
    Trap(String),
    #[error("Device reported fatal error: {0}")]
    Fatal(String),
    #[error("Session is not connected")]
    NotConnected,
    #[error("Device has no usable API address: {0}")]
    InvalidTarget(String),
}
