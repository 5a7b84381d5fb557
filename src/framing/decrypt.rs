//! The decrypting half of the chunk stream.

use crate::crypto::{Aead, CipherKind, MasterKey, Nonce, TAG_SIZE};
use crate::error::{Error, Result};
use crate::framing::{LENGTH_SIZE, MAX_PAYLOAD_LEN};

/// Opening state established once the salt has been consumed.
struct Opener {
    aead: Aead,
    nonce: Nonce,
}

impl Opener {
    /// Open one ciphertext and advance the nonce.
    fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let out = self.aead.open(&self.nonce, ciphertext)?;
        self.nonce.increment();
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the peer's salt prefix.
    AwaitSalt,
    /// Waiting for an encrypted length field (2 bytes + tag).
    AwaitLength,
    /// Waiting for an encrypted payload of the given length (+ tag).
    AwaitPayload(usize),
}

/// Converts one direction's encrypted chunk stream back into plaintext.
///
/// Input arrives as arbitrary byte buffers; a carry buffer holds
/// whatever does not yet complete the current state's requirement, so
/// frames may be split at any boundary. Any authentication failure or
/// out-of-range length poisons the decryptor: the error is fatal for
/// the tunnel and no plaintext from the offending chunk is released.
pub struct Decryptor {
    kind: CipherKind,
    master: MasterKey,
    opener: Option<Opener>,
    state: State,
    buffer: Vec<u8>,
    poisoned: bool,
}

impl Decryptor {
    /// Create a decryptor that has not yet seen the peer's salt.
    pub fn new(kind: CipherKind, master: MasterKey) -> Self {
        Self {
            kind,
            master,
            opener: None,
            state: State::AwaitSalt,
            buffer: Vec::new(),
            poisoned: false,
        }
    }

    /// Absorb `input` and return every plaintext byte that can be
    /// released so far.
    ///
    /// # Errors
    ///
    /// Fails on tag verification failure or a length field outside
    /// `[1, 0x3FFF]`. After a failure every further call fails too.
    pub fn push(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if self.poisoned {
            return Err(Error::aead("decryptor previously failed"));
        }
        self.buffer.extend_from_slice(input);

        let mut out = Vec::new();
        match self.drain(&mut out) {
            Ok(()) => Ok(out),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// True while the carry buffer holds a partial frame, i.e. an EOF
    /// right now would cut a chunk in half.
    pub fn mid_chunk(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::AwaitPayload(_))
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> Result<()> {
        loop {
            match self.state {
                State::AwaitSalt => {
                    let salt_len = self.kind.salt_len();
                    if self.buffer.len() < salt_len {
                        return Ok(());
                    }
                    let salt: Vec<u8> = self.buffer.drain(..salt_len).collect();
                    let subkey = self.master.derive_subkey(&salt)?;
                    self.opener = Some(Opener {
                        aead: Aead::new(self.kind, &subkey),
                        nonce: Nonce::zero(),
                    });
                    self.state = State::AwaitLength;
                }
                State::AwaitLength => {
                    let need = LENGTH_SIZE + TAG_SIZE;
                    if self.buffer.len() < need {
                        return Ok(());
                    }
                    let sealed: Vec<u8> = self.buffer.drain(..need).collect();
                    let len = self.opener_mut().open(&sealed)?;
                    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
                    if len == 0 || len > MAX_PAYLOAD_LEN {
                        return Err(Error::aead(format!(
                            "chunk length {} out of range [1, {}]",
                            len, MAX_PAYLOAD_LEN
                        )));
                    }
                    self.state = State::AwaitPayload(len);
                }
                State::AwaitPayload(len) => {
                    let need = len + TAG_SIZE;
                    if self.buffer.len() < need {
                        return Ok(());
                    }
                    let sealed: Vec<u8> = self.buffer.drain(..need).collect();
                    let plaintext = self.opener_mut().open(&sealed)?;
                    out.extend_from_slice(&plaintext);
                    self.state = State::AwaitLength;
                }
            }
        }
    }

    fn opener_mut(&mut self) -> &mut Opener {
        match self.opener.as_mut() {
            Some(opener) => opener,
            // AwaitLength/AwaitPayload are only entered after AwaitSalt
            // installed the opener.
            None => unreachable!("opener installed before leaving AwaitSalt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::Encryptor;

    #[test]
    fn test_push_after_failure_keeps_failing() {
        let kind = CipherKind::Aes128Gcm;
        let master = MasterKey::from_password(b"pw", kind.key_len());
        let mut enc = Encryptor::new(kind, master.clone());
        let mut wire = enc.push(b"payload").unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;

        let mut dec = Decryptor::new(kind, master);
        assert!(dec.push(&wire).is_err());
        assert!(dec.push(&[]).is_err());
    }

    #[test]
    fn test_wrong_password_fails_on_first_chunk() {
        let kind = CipherKind::ChaCha20Poly1305;
        let mut enc = Encryptor::new(kind, MasterKey::from_password(b"right", kind.key_len()));
        let wire = enc.push(b"payload").unwrap();

        let mut dec = Decryptor::new(kind, MasterKey::from_password(b"wrong", kind.key_len()));
        assert!(dec.push(&wire).is_err());
    }

    #[test]
    fn test_no_output_until_full_chunk() {
        let kind = CipherKind::Aes256Gcm;
        let master = MasterKey::from_password(b"pw", kind.key_len());
        let mut enc = Encryptor::new(kind, master.clone());
        let wire = enc.push(b"withheld").unwrap();

        let mut dec = Decryptor::new(kind, master);
        // Salt plus the sealed length alone release nothing.
        let upto = kind.salt_len() + LENGTH_SIZE + TAG_SIZE;
        assert!(dec.push(&wire[..upto]).unwrap().is_empty());
        assert_eq!(dec.push(&wire[upto..]).unwrap(), b"withheld");
    }
}
