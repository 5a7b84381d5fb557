//! The encrypting half of the chunk stream.

use crate::crypto::{Aead, CipherKind, MasterKey, Nonce, SecureRandom, TAG_SIZE};
use crate::error::Result;
use crate::framing::{LENGTH_SIZE, MAX_PAYLOAD_LEN};

/// Sealing state established once the salt has been emitted.
struct Sealer {
    aead: Aead,
    nonce: Nonce,
}

impl Sealer {
    /// Seal one buffer and advance the nonce.
    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let out = self.aead.seal(&self.nonce, plaintext)?;
        self.nonce.increment();
        Ok(out)
    }

    /// Cut `plaintext` into chunks of at most [`MAX_PAYLOAD_LEN`] bytes,
    /// sealing an encrypted length followed by the encrypted payload for
    /// each, in order.
    fn seal_chunks(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<()> {
        for chunk in plaintext.chunks(MAX_PAYLOAD_LEN) {
            let len = (chunk.len() as u16).to_be_bytes();
            let header = self.seal(&len)?;
            out.extend_from_slice(&header);
            let body = self.seal(chunk)?;
            out.extend_from_slice(&body);
        }
        Ok(())
    }
}

/// Converts one direction's plaintext into the encrypted chunk stream.
///
/// Starts in a salt-pending state: the first non-empty input triggers
/// salt generation, subkey derivation and the verbatim salt prefix on
/// the wire. From then on every input buffer is cut into sub-chunks of
/// at most [`MAX_PAYLOAD_LEN`] bytes, preserving byte order.
pub struct Encryptor {
    kind: CipherKind,
    master: MasterKey,
    sealer: Option<Sealer>,
}

impl Encryptor {
    /// Create an encryptor that has not yet emitted its salt.
    pub fn new(kind: CipherKind, master: MasterKey) -> Self {
        Self {
            kind,
            master,
            sealer: None,
        }
    }

    /// Encrypt `plaintext`, returning the bytes to put on the wire.
    ///
    /// An empty input produces no output and no state change. The
    /// return value for the first non-empty input begins with the
    /// freshly generated salt.
    pub fn push(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = plaintext.len().div_ceil(MAX_PAYLOAD_LEN);
        let mut out = Vec::with_capacity(
            self.kind.salt_len() + plaintext.len() + chunks * (LENGTH_SIZE + 2 * TAG_SIZE),
        );

        let mut sealer = match self.sealer.take() {
            Some(sealer) => sealer,
            None => {
                let salt = SecureRandom::salt(self.kind.salt_len());
                let subkey = self.master.derive_subkey(&salt)?;
                out.extend_from_slice(&salt);
                Sealer {
                    aead: Aead::new(self.kind, &subkey),
                    nonce: Nonce::zero(),
                }
            }
        };

        let sealed = sealer.seal_chunks(plaintext, &mut out);
        self.sealer = Some(sealer);
        sealed.map(|()| out)
    }
}
