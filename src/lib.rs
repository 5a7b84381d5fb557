//! # sslocal
//!
//! A local SOCKS5 front-end that tunnels TCP traffic through a remote
//! Shadowsocks relay using the Shadowsocks AEAD wire protocol.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Listener (127.0.0.1:local_port, one task per tunnel)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  SOCKS5 negotiation (NoAuth, CONNECT)                   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Tunnel supervision (four pipes, half-close, idle)      │
//! ├─────────────────────────────────────────────────────────┤
//! │  AEAD chunk framing (salt ‖ E(len)‖tag ‖ E(data)‖tag …) │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto (EVP_BytesToKey + HKDF-SHA1, AES-GCM/ChaCha20)  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each accepted connection is negotiated in the clear, then paired
//! with a fresh connection to the relay. Client bytes travel as
//! length-prefixed AEAD chunks; relay bytes are authenticated and
//! decrypted back to the client. Both directions derive their own
//! subkey from an independent random salt, so no key or nonce is ever
//! reused across tunnels.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod framing;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
