//! Error types for the local relay.

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving tunnels.
///
/// Every variant except [`Error::Config`] is scoped to a single tunnel:
/// the listener and all other tunnels are unaffected by it.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (unsupported method, missing field). Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or unsupported SOCKS5 traffic from the local client.
    #[error("SOCKS5 protocol error: {0}")]
    Socks(String),

    /// The remote relay could not be reached.
    #[error("remote dial failed: {0}")]
    RemoteDial(String),

    /// AEAD tag verification failed, or a chunk length was out of range.
    ///
    /// Fatal for the tunnel; no partial plaintext from the offending
    /// chunk is ever released.
    #[error("AEAD failure: {0}")]
    Aead(String),

    /// Socket read/write error, or EOF in the middle of a chunk.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No bytes moved in either direction within the configured interval.
    #[error("tunnel idle for {0}s")]
    IdleTimeout(u64),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new SOCKS5 protocol error.
    pub fn socks(msg: impl Into<String>) -> Self {
        Error::Socks(msg.into())
    }

    /// Create a new AEAD failure.
    pub fn aead(msg: impl Into<String>) -> Self {
        Error::Aead(msg.into())
    }

    /// Errors logged at ERROR rather than DEBUG: authentication failures
    /// and unreachable relays are operator-visible, the rest is routine
    /// connection churn.
    pub fn is_loud(&self) -> bool {
        matches!(self, Error::Aead(_) | Error::RemoteDial(_))
    }
}
