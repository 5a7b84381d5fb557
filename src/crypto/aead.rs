//! Suite-generic AEAD seal/open with counter nonces.
//!
//! All three supported suites use 96-bit nonces and 128-bit tags, and
//! the Shadowsocks AEAD protocol always runs them with empty associated
//! data.

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead as AeadTrait, KeyInit},
    Aes128Gcm, Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;

use crate::crypto::{CipherKind, SessionKey, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// A nonce (number used once) for AEAD operations.
///
/// The 12-byte buffer is treated as a little-endian unsigned counter
/// starting at zero and incremented by one after every seal or open.
/// This layout is a wire contract with the remote relay, not an internal
/// detail: only the low 8 bytes ever vary in practice because 2^64
/// operations is unreachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// The zero nonce every direction starts from.
    pub fn zero() -> Self {
        Self([0u8; NONCE_SIZE])
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Increment the counter, rippling the carry little-endian across
    /// the whole buffer.
    pub fn increment(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
    }
}

impl From<u64> for Nonce {
    fn from(counter: u64) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..8].copy_from_slice(&counter.to_le_bytes());
        Self(nonce)
    }
}

#[allow(clippy::large_enum_variant)]
enum Inner {
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
    ChaCha20Poly1305(ChaCha20Poly1305),
}

/// An AEAD instance bound to one session key.
///
/// The caller owns the nonce; seal and open never mutate shared state,
/// so a tunnel's two directions hold fully independent `Aead` values.
pub struct Aead {
    inner: Inner,
}

impl Aead {
    /// Create an AEAD instance for the given suite and session key.
    ///
    /// The key length is fixed by the suite; `SessionKey`s derived
    /// through [`crate::crypto::MasterKey`] always match it.
    pub fn new(kind: CipherKind, key: &SessionKey) -> Self {
        let inner = match kind {
            CipherKind::Aes128Gcm => {
                Inner::Aes128Gcm(Aes128Gcm::new(GenericArray::from_slice(key.as_bytes())))
            }
            CipherKind::Aes256Gcm => {
                Inner::Aes256Gcm(Aes256Gcm::new(GenericArray::from_slice(key.as_bytes())))
            }
            CipherKind::ChaCha20Poly1305 => Inner::ChaCha20Poly1305(ChaCha20Poly1305::new(
                GenericArray::from_slice(key.as_bytes()),
            )),
        };
        Self { inner }
    }

    /// Encrypt `plaintext`, returning ciphertext with the 16-byte tag
    /// appended. Associated data is empty per the wire protocol.
    pub fn seal(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = GenericArray::from_slice(nonce.as_bytes());
        match &self.inner {
            Inner::Aes128Gcm(c) => c.encrypt(nonce, plaintext),
            Inner::Aes256Gcm(c) => c.encrypt(nonce, plaintext),
            Inner::ChaCha20Poly1305(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| Error::aead("seal failed"))
    }

    /// Decrypt and authenticate `ciphertext` (trailing 16-byte tag).
    ///
    /// # Errors
    ///
    /// Fails if the tag does not verify (wrong key, wrong nonce, or
    /// tampered ciphertext). No plaintext is released on failure.
    pub fn open(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::aead(format!(
                "ciphertext shorter than tag: {} bytes",
                ciphertext.len()
            )));
        }
        let nonce = GenericArray::from_slice(nonce.as_bytes());
        match &self.inner {
            Inner::Aes128Gcm(c) => c.decrypt(nonce, ciphertext),
            Inner::Aes256Gcm(c) => c.decrypt(nonce, ciphertext),
            Inner::ChaCha20Poly1305(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| Error::aead("tag verification failed"))
    }
}
