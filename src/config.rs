//! Relay configuration.

use serde::{Deserialize, Serialize};

use crate::crypto::CipherKind;

/// Default local SOCKS5 port.
pub const DEFAULT_LOCAL_PORT: u16 = 1080;

/// Default connect/idle timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the local relay.
///
/// Read-only after startup; every tunnel shares one instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote Shadowsocks server hostname or IP.
    pub server_addr: String,

    /// Remote Shadowsocks server port.
    pub server_port: u16,

    /// Shared password, stretched into the master key at startup.
    pub password: String,

    /// AEAD method, e.g. `"aes-256-gcm"`.
    pub method: CipherKind,

    /// Local SOCKS5 listen port on 127.0.0.1.
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Connect deadline and per-tunnel idle deadline, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.server_addr.is_empty() {
            return Err("server_addr cannot be empty".to_string());
        }
        if self.server_port == 0 {
            return Err("server_port cannot be zero".to_string());
        }
        if self.password.is_empty() {
            return Err("password cannot be empty".to_string());
        }
        if self.timeout == 0 {
            return Err("timeout cannot be zero".to_string());
        }
        Ok(())
    }

    /// The `host:port` string of the remote relay.
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_addr, self.server_port)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The password stays out of logs.
        f.debug_struct("Config")
            .field("server_addr", &self.server_addr)
            .field("server_port", &self.server_port)
            .field("method", &self.method)
            .field("local_port", &self.local_port)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
