//! The Shadowsocks AEAD chunk stream.
//!
//! Each direction of a tunnel is one byte stream of the form
//! `salt ‖ chunk ‖ chunk ‖ …`, where every chunk is
//! `E(len) ‖ tag ‖ E(payload) ‖ tag`: two AEAD operations sharing one
//! subkey but consuming consecutive nonces. `len` is a 2-byte
//! big-endian payload length in `[1, 0x3FFF]`.
//!
//! The two halves are stateful byte-in/byte-out engines
//! (`push(bytes) -> bytes`) so the I/O layer can drive them without the
//! framer touching sockets; a stalled downstream write simply stops the
//! caller from pushing, which stalls the upstream read in turn.

mod decrypt;
mod encrypt;

pub use decrypt::Decryptor;
pub use encrypt::Encryptor;

/// Maximum payload bytes per chunk, fixed by the Shadowsocks AEAD protocol.
pub const MAX_PAYLOAD_LEN: usize = 0x3FFF;

/// Size of the big-endian length field preceding each payload.
pub const LENGTH_SIZE: usize = 2;
