//! Cryptographic primitives for the Shadowsocks AEAD protocol.
//!
//! This module provides:
//! - the closed set of supported AEAD cipher suites
//! - suite-generic AEAD seal/open with counter nonces
//! - the two-stage key schedule (password stretch + HKDF-SHA1 subkey)
//! - secure random salt generation
//!
//! All secret material is zeroized on drop to prevent memory leakage.

mod aead;
mod kdf;
mod random;

pub use aead::{Aead, Nonce};
pub use kdf::{MasterKey, SessionKey};
pub use random::SecureRandom;

/// Size of AEAD nonces in bytes (96 bits for all supported suites).
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tags in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// The closed set of AEAD methods this relay speaks.
///
/// Stream ciphers from the pre-AEAD era are deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CipherKind {
    /// AES-128-GCM: 16-byte key, 16-byte salt.
    #[serde(rename = "aes-128-gcm")]
    Aes128Gcm,
    /// AES-256-GCM: 32-byte key, 32-byte salt.
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20-IETF-Poly1305: 32-byte key, 32-byte salt.
    #[serde(rename = "chacha20-ietf-poly1305")]
    ChaCha20Poly1305,
}

impl CipherKind {
    /// Key size in bytes.
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes256Gcm | CipherKind::ChaCha20Poly1305 => 32,
        }
    }

    /// Per-direction salt size in bytes. Equal to the key size for every
    /// supported suite.
    pub fn salt_len(self) -> usize {
        self.key_len()
    }

    /// The canonical method name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
            CipherKind::ChaCha20Poly1305 => "chacha20-ietf-poly1305",
        }
    }
}

impl std::fmt::Display for CipherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
