//! SOCKS5 (RFC 1928) negotiation for the local listener.
//!
//! Speaks the subset a tunnelling front-end needs: the `NoAuth` method
//! and the `CONNECT` command. The negotiator parses the greeting and
//! request and yields the target address record; the success reply is
//! the supervisor's to send once the remote connection stands.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const SOCKS5_VERSION: u8 = 0x05;

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Request granted.
pub const REP_SUCCESS: u8 = 0x00;
/// General SOCKS server failure.
pub const REP_GENERAL_FAILURE: u8 = 0x01;
/// Command not supported.
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;
/// Address type not supported.
pub const REP_ATYP_NOT_SUPPORTED: u8 = 0x08;

/// The target a SOCKS5 client asked to reach.
///
/// Encodes to the `[ATYP | ADDR | PORT]` wire record that travels to
/// the remote relay as the first plaintext payload. Domain names are
/// forwarded verbatim; resolution happens at the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// ATYP 0x01: IPv4 address and port.
    V4(Ipv4Addr, u16),
    /// ATYP 0x03: domain name and port.
    Domain(String, u16),
    /// ATYP 0x04: IPv6 address and port.
    V6(Ipv6Addr, u16),
}

impl TargetAddr {
    /// Encode as the Shadowsocks target address record.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TargetAddr::V4(ip, port) => {
                let mut record = Vec::with_capacity(7);
                record.push(ATYP_IPV4);
                record.extend_from_slice(&ip.octets());
                record.extend_from_slice(&port.to_be_bytes());
                record
            }
            TargetAddr::Domain(domain, port) => {
                let mut record = Vec::with_capacity(4 + domain.len());
                record.push(ATYP_DOMAIN);
                record.push(domain.len() as u8);
                record.extend_from_slice(domain.as_bytes());
                record.extend_from_slice(&port.to_be_bytes());
                record
            }
            TargetAddr::V6(ip, port) => {
                let mut record = Vec::with_capacity(19);
                record.push(ATYP_IPV6);
                record.extend_from_slice(&ip.octets());
                record.extend_from_slice(&port.to_be_bytes());
                record
            }
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::V4(ip, port) => write!(f, "{}:{}", ip, port),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
            TargetAddr::V6(ip, port) => write!(f, "[{}]:{}", ip, port),
        }
    }
}

/// Drive the SOCKS5 greeting and request until the client's target is
/// known.
///
/// Replies to the greeting and to failed requests itself; on success it
/// returns without sending the final reply.
pub async fn negotiate<S>(stream: &mut S) -> Result<TargetAddr>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // === Greeting ===
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS5_VERSION {
        return Err(Error::socks(format!(
            "unexpected version byte 0x{:02x} in greeting",
            head[0]
        )));
    }

    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&METHOD_NO_AUTH) {
        stream
            .write_all(&[SOCKS5_VERSION, METHOD_NONE_ACCEPTABLE])
            .await?;
        return Err(Error::socks("client offers no acceptable auth method"));
    }
    stream.write_all(&[SOCKS5_VERSION, METHOD_NO_AUTH]).await?;

    // === Request ===
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS5_VERSION || head[2] != 0x00 {
        return Err(Error::socks("malformed request header"));
    }
    if head[1] != CMD_CONNECT {
        reply(stream, REP_CMD_NOT_SUPPORTED).await?;
        return Err(Error::socks(format!(
            "unsupported command 0x{:02x}",
            head[1]
        )));
    }

    match head[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 6];
            stream.read_exact(&mut addr).await?;
            let ip = Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]);
            let port = u16::from_be_bytes([addr[4], addr[5]]);
            Ok(TargetAddr::V4(ip, port))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            if len[0] == 0 {
                reply(stream, REP_GENERAL_FAILURE).await?;
                return Err(Error::socks("zero-length domain"));
            }
            let mut rest = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut rest).await?;
            let port = u16::from_be_bytes([rest[rest.len() - 2], rest[rest.len() - 1]]);
            let domain = String::from_utf8(rest[..rest.len() - 2].to_vec())
                .map_err(|_| Error::socks("invalid domain encoding"))?;
            Ok(TargetAddr::Domain(domain, port))
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 18];
            stream.read_exact(&mut addr).await?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&addr[..16]);
            let port = u16::from_be_bytes([addr[16], addr[17]]);
            Ok(TargetAddr::V6(Ipv6Addr::from(octets), port))
        }
        other => {
            reply(stream, REP_ATYP_NOT_SUPPORTED).await?;
            Err(Error::socks(format!(
                "unsupported address type 0x{:02x}",
                other
            )))
        }
    }
}

/// Send a SOCKS5 reply with the given REP code.
///
/// The bound-address fields are zeroed; standard clients ignore them.
pub async fn reply<S>(stream: &mut S, rep: u8) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let response = [
        SOCKS5_VERSION,
        rep,
        0x00, // RSV
        ATYP_IPV4,
        0, 0, 0, 0, // BND.ADDR 0.0.0.0
        0, 0, // BND.PORT 0
    ];
    stream.write_all(&response).await?;
    Ok(())
}
