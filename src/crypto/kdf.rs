//! The two-stage Shadowsocks key schedule.
//!
//! Stage one stretches the user password into a master key with the
//! OpenSSL-legacy MD5 construction (`EVP_BytesToKey` with an empty
//! salt). Stage two derives a per-session subkey with HKDF-SHA1, keyed
//! by the per-direction random salt and the ASCII info string
//! `"ss-subkey"`.
//!
//! The MD5 stretch is cryptographically weak by modern standards and is
//! retained strictly for interoperability with Shadowsocks servers; it
//! must not be reused for anything else.

use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// HKDF info string fixed by the Shadowsocks AEAD protocol.
const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// The password-derived master key, shared by every tunnel.
///
/// Automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    /// Stretch a password into `key_len` bytes of master key material.
    ///
    /// `d_0 = MD5(password)`, `d_i = MD5(d_{i-1} ‖ password)`; the output
    /// is `d_0 ‖ d_1 ‖ …` truncated to `key_len`.
    pub fn from_password(password: &[u8], key_len: usize) -> Self {
        let mut okm = Vec::with_capacity(key_len + 15);
        let mut prev: Vec<u8> = Vec::new();
        while okm.len() < key_len {
            let mut hasher = Md5::new();
            hasher.update(&prev);
            hasher.update(password);
            prev = hasher.finalize().to_vec();
            okm.extend_from_slice(&prev);
        }
        prev.zeroize();
        okm.truncate(key_len);
        Self(okm)
    }

    /// Derive the per-session subkey for one direction of one tunnel.
    ///
    /// Pure: the same master key and salt always yield the same subkey.
    pub fn derive_subkey(&self, salt: &[u8]) -> Result<SessionKey> {
        let hk = Hkdf::<Sha1>::new(Some(salt), &self.0);
        let mut okm = vec![0u8; self.0.len()];
        hk.expand(SUBKEY_INFO, &mut okm)
            .map_err(|_| Error::aead("HKDF expansion failed"))?;
        Ok(SessionKey(okm))
    }

}

impl AsRef<[u8]> for MasterKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A derived per-direction session key.
///
/// Immutable for the lifetime of one direction of one tunnel, zeroized
/// when the tunnel terminates.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care, this is secret key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for SessionKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_stretch_16() {
        // MD5("pass"), single round fills a 16-byte key.
        let key = MasterKey::from_password(b"pass", 16);
        assert_eq!(
            key.as_ref(),
            &[
                0x1a, 0x1d, 0xc9, 0x1c, 0x90, 0x73, 0x25, 0xc6, 0x92, 0x71, 0xdd, 0xf0, 0xc9,
                0x44, 0xbc, 0x72,
            ]
        );
    }

    #[test]
    fn test_password_stretch_32() {
        // Two rounds: d0 = MD5("pass"), d1 = MD5(d0 ‖ "pass").
        let key = MasterKey::from_password(b"pass", 32);
        assert_eq!(
            key.as_ref(),
            &[
                0x1a, 0x1d, 0xc9, 0x1c, 0x90, 0x73, 0x25, 0xc6, 0x92, 0x71, 0xdd, 0xf0, 0xc9,
                0x44, 0xbc, 0x72, 0x53, 0x53, 0x55, 0x01, 0x27, 0x88, 0xd8, 0xb1, 0x89, 0x3a,
                0x4e, 0xb0, 0x68, 0x64, 0xf3, 0xe1,
            ]
        );
    }

    #[test]
    fn test_subkey_derivation_vector() {
        // aes-256-gcm, password "pass", salt = 32 zero bytes.
        let master = MasterKey::from_password(b"pass", 32);
        let subkey = master.derive_subkey(&[0u8; 32]).unwrap();
        assert_eq!(
            subkey.as_bytes(),
            &[
                0x0a, 0x71, 0xa5, 0x56, 0x11, 0xb0, 0xfd, 0x8e, 0xb5, 0x2b, 0xd2, 0x17, 0xad,
                0x99, 0x3b, 0x8d, 0xbe, 0x01, 0x80, 0x8f, 0x3d, 0x54, 0x91, 0x84, 0x37, 0xe6,
                0x22, 0x92, 0x34, 0xe5, 0x23, 0x41,
            ]
        );
    }

    #[test]
    fn test_subkey_is_pure() {
        let master = MasterKey::from_password(b"12345678", 32);
        let salt = [0x42u8; 32];
        let a = master.derive_subkey(&salt).unwrap();
        let b = master.derive_subkey(&salt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_salts_different_subkeys() {
        let master = MasterKey::from_password(b"12345678", 32);
        let a = master.derive_subkey(&[0x01u8; 32]).unwrap();
        let b = master.derive_subkey(&[0x02u8; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_subkey_length_follows_master() {
        let master = MasterKey::from_password(b"pw", 16);
        let subkey = master.derive_subkey(&[0u8; 16]).unwrap();
        assert_eq!(subkey.as_bytes().len(), 16);
    }
}
