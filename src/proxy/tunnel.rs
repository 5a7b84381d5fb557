//! Per-connection tunnel supervision.
//!
//! One tunnel pairs a local SOCKS5 connection with a connection to the
//! remote relay and owns both cipher halves. The four pipes
//! (`client_in → Encryptor → remote_out`, `remote_in → Decryptor →
//! client_out`) run concurrently; any socket error, EOF mid-chunk,
//! AEAD failure or idle expiry funnels into one teardown that closes
//! both sockets and drops the cipher state.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{interval, timeout};
use tracing::{debug, info};

use crate::config::Config;
use crate::crypto::MasterKey;
use crate::error::{Error, Result};
use crate::framing::{Decryptor, Encryptor};
use crate::proxy::socks5;

/// Read buffer size for both directions.
const READ_BUF_SIZE: usize = 16 * 1024;

/// How often the idle watchdog wakes up.
const WATCHDOG_PERIOD: Duration = Duration::from_millis(500);

/// State shared by every tunnel: the configuration and the master key
/// stretched from the password once at startup.
pub struct TunnelContext {
    config: Config,
    master: MasterKey,
}

impl TunnelContext {
    /// Stretch the password and capture the configuration.
    pub fn new(config: Config) -> Self {
        let master =
            MasterKey::from_password(config.password.as_bytes(), config.method.key_len());
        Self { config, master }
    }

    /// The shared configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Serve one accepted local connection to completion.
///
/// Drives the SOCKS5 negotiation, dials the remote relay under the
/// connect deadline, sends the target record as the first encrypted
/// payload, then relays until both halves close or a fatal error ends
/// the tunnel.
pub async fn serve(ctx: Arc<TunnelContext>, mut client: TcpStream, peer: SocketAddr) -> Result<()> {
    let target = socks5::negotiate(&mut client).await?;
    debug!("SOCKS5 CONNECT from {} to {}", peer, target);

    let deadline = Duration::from_secs(ctx.config.timeout);
    let endpoint = ctx.config.server_endpoint();
    let mut remote = match timeout(deadline, TcpStream::connect(&endpoint)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            let _ = socks5::reply(&mut client, socks5::REP_GENERAL_FAILURE).await;
            return Err(Error::RemoteDial(format!("{}: {}", endpoint, e)));
        }
        Err(_) => {
            let _ = socks5::reply(&mut client, socks5::REP_GENERAL_FAILURE).await;
            return Err(Error::RemoteDial(format!(
                "{}: connect timeout after {}s",
                endpoint, ctx.config.timeout
            )));
        }
    };

    client.set_nodelay(true).ok();
    remote.set_nodelay(true).ok();

    let mut encryptor = Encryptor::new(ctx.config.method, ctx.master.clone());
    let decryptor = Decryptor::new(ctx.config.method, ctx.master.clone());

    // The target record is the first payload on the encrypted channel:
    // its wire form carries the salt prefix.
    let header = encryptor.push(&target.encode())?;
    remote.write_all(&header).await?;

    socks5::reply(&mut client, socks5::REP_SUCCESS).await?;
    info!("tunnel established: {} -> {} via {}", peer, target, endpoint);

    let result = relay(client, remote, encryptor, decryptor, deadline).await;
    match &result {
        Ok(()) => debug!("tunnel closed: {} -> {}", peer, target),
        Err(e) => debug!("tunnel terminated: {} -> {}: {}", peer, target, e),
    }
    result
}

/// Millisecond-resolution record of the last byte movement in either
/// direction, shared lock-free between the two pipes and the watchdog.
struct ActivityClock {
    epoch: Instant,
    last_millis: AtomicU64,
}

impl ActivityClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        self.last_millis
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_millis.load(Ordering::Relaxed)))
    }
}

/// Run the four pipes until both directions finish, a fatal error
/// occurs, or the idle deadline passes.
async fn relay(
    client: TcpStream,
    remote: TcpStream,
    encryptor: Encryptor,
    decryptor: Decryptor,
    idle: Duration,
) -> Result<()> {
    let (client_read, client_write) = client.into_split();
    let (remote_read, remote_write) = remote.into_split();

    let activity = Arc::new(ActivityClock::new());

    let mut uplink = tokio::spawn(run_uplink(
        client_read,
        remote_write,
        encryptor,
        Arc::clone(&activity),
    ));
    let mut downlink = tokio::spawn(run_downlink(
        remote_read,
        client_write,
        decryptor,
        Arc::clone(&activity),
    ));

    let mut uplink_done = false;
    let mut downlink_done = false;
    let mut ticker = interval(WATCHDOG_PERIOD);
    let mut verdict: Result<()> = Ok(());

    while !(uplink_done && downlink_done) {
        tokio::select! {
            r = &mut uplink, if !uplink_done => {
                uplink_done = true;
                if let Err(e) = pipe_result(r) {
                    verdict = Err(e);
                    break;
                }
            }
            r = &mut downlink, if !downlink_done => {
                downlink_done = true;
                if let Err(e) = pipe_result(r) {
                    verdict = Err(e);
                    break;
                }
            }
            _ = ticker.tick() => {
                if activity.idle_for() >= idle {
                    verdict = Err(Error::IdleTimeout(idle.as_secs()));
                    break;
                }
            }
        }
    }

    // Idempotent teardown: cancel whatever still runs, then reap so the
    // socket halves and cipher state are dropped before returning.
    if !uplink_done {
        uplink.abort();
        let _ = uplink.await;
    }
    if !downlink_done {
        downlink.abort();
        let _ = downlink.await;
    }

    verdict
}

fn pipe_result(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(join) if join.is_cancelled() => Ok(()),
        Err(join) => Err(Error::Transport(io::Error::new(io::ErrorKind::Other, join))),
    }
}

/// `client_in → Encryptor → remote_out`.
///
/// Local EOF half-closes the remote write side; the tunnel stays up
/// for the other direction.
async fn run_uplink(
    mut client_in: OwnedReadHalf,
    mut remote_out: OwnedWriteHalf,
    mut encryptor: Encryptor,
    activity: Arc<ActivityClock>,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = client_in.read(&mut buf).await?;
        if n == 0 {
            remote_out.shutdown().await?;
            return Ok(());
        }
        activity.touch();
        let wire = encryptor.push(&buf[..n])?;
        remote_out.write_all(&wire).await?;
        activity.touch();
    }
}

/// `remote_in → Decryptor → client_out`.
///
/// A clean remote EOF on a chunk boundary half-closes the client write
/// side; EOF in the middle of a chunk is a transport error.
async fn run_downlink(
    mut remote_in: OwnedReadHalf,
    mut client_out: OwnedWriteHalf,
    mut decryptor: Decryptor,
    activity: Arc<ActivityClock>,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = remote_in.read(&mut buf).await?;
        if n == 0 {
            if decryptor.mid_chunk() {
                return Err(Error::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "remote closed mid-chunk",
                )));
            }
            client_out.shutdown().await?;
            return Ok(());
        }
        activity.touch();
        let plaintext = decryptor.push(&buf[..n])?;
        if !plaintext.is_empty() {
            client_out.write_all(&plaintext).await?;
            activity.touch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherKind;
    use tokio::net::TcpListener;

    fn test_config(server_port: u16, timeout: u64) -> Config {
        Config {
            server_addr: "127.0.0.1".into(),
            server_port,
            password: "test-password".into(),
            method: CipherKind::ChaCha20Poly1305,
            local_port: 0,
            timeout,
        }
    }

    /// Accept one relay-side connection, assert the first decrypted
    /// bytes are `expected_record`, echo one response, mirror EOF.
    async fn mock_remote(
        listener: TcpListener,
        master: MasterKey,
        expected_record: Vec<u8>,
        response: Vec<u8>,
    ) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let kind = CipherKind::ChaCha20Poly1305;
        let mut dec = Decryptor::new(kind, master.clone());
        let mut enc = Encryptor::new(kind, master);

        // Drain the client stream until EOF, checking the record first.
        let mut plaintext = Vec::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            plaintext.extend(dec.push(&buf[..n]).unwrap());
        }
        assert!(plaintext.len() >= expected_record.len());
        assert_eq!(&plaintext[..expected_record.len()], &expected_record[..]);

        let wire = enc.push(&response).unwrap();
        stream.write_all(&wire).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    async fn connect_pair(ctx: Arc<TunnelContext>) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();
        tokio::spawn(async move {
            let _ = serve(ctx, server_side, peer).await;
        });
        client
    }

    async fn socks5_connect(client: &mut TcpStream, request: &[u8]) -> u8 {
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method = [0u8; 2];
        client.read_exact(&mut method).await.unwrap();
        assert_eq!(method, [0x05, 0x00]);

        client.write_all(request).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0x05);
        reply[1]
    }

    #[tokio::test]
    async fn test_domain_connect_forwards_record_and_relays() {
        let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote_port = remote_listener.local_addr().unwrap().port();

        let ctx = Arc::new(TunnelContext::new(test_config(remote_port, 60)));
        let record = b"\x03\x0bexample.com\x00\x50".to_vec();
        let remote = tokio::spawn(mock_remote(
            remote_listener,
            ctx.master.clone(),
            [record.clone(), b"GET / HTTP/1.1".to_vec()].concat(),
            b"HTTP/1.1 200 OK".to_vec(),
        ));

        let mut client = connect_pair(Arc::clone(&ctx)).await;
        let rep = socks5_connect(&mut client, b"\x05\x01\x00\x03\x0bexample.com\x00\x50").await;
        assert_eq!(rep, 0x00);

        client.write_all(b"GET / HTTP/1.1").await.unwrap();
        // Half-close: the response must still arrive after our EOF.
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK");

        remote.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_dial_failure_replies_general_failure() {
        // Grab a port nobody listens on.
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        let ctx = Arc::new(TunnelContext::new(test_config(port, 2)));
        let mut client = connect_pair(ctx).await;
        let rep =
            socks5_connect(&mut client, &[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 80]).await;
        assert_eq!(rep, 0x01);
    }

    #[tokio::test]
    async fn test_idle_timeout_tears_down_both_sockets() {
        let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote_port = remote_listener.local_addr().unwrap().port();

        // Silent remote: accepts and never speaks.
        let remote = tokio::spawn(async move {
            let (mut stream, _) = remote_listener.accept().await.unwrap();
            let mut sink = Vec::new();
            stream.read_to_end(&mut sink).await.unwrap();
        });

        let ctx = Arc::new(TunnelContext::new(test_config(remote_port, 1)));
        let mut client = connect_pair(ctx).await;
        let rep =
            socks5_connect(&mut client, &[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 80]).await;
        assert_eq!(rep, 0x00);

        // Send nothing: within a few seconds the tunnel must close us.
        let started = Instant::now();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(started.elapsed() < Duration::from_secs(5));

        remote.await.unwrap();
    }

    #[tokio::test]
    async fn test_tampered_downstream_kills_tunnel() {
        let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote_port = remote_listener.local_addr().unwrap().port();

        let ctx = Arc::new(TunnelContext::new(test_config(remote_port, 60)));
        let master = ctx.master.clone();

        // Remote that answers with a corrupted chunk.
        let remote = tokio::spawn(async move {
            let (mut stream, _) = remote_listener.accept().await.unwrap();
            let kind = CipherKind::ChaCha20Poly1305;
            let mut enc = Encryptor::new(kind, master);

            // Consume the header chunk without caring about its bytes.
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();

            let mut wire = enc.push(b"poisoned payload").unwrap();
            let last = wire.len() - 1;
            wire[last] ^= 0x80;
            stream.write_all(&wire).await.unwrap();

            // The tunnel must hang up on us.
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        let mut client = connect_pair(ctx).await;
        let rep =
            socks5_connect(&mut client, &[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 80]).await;
        assert_eq!(rep, 0x00);

        // No plaintext from the tampered chunk may reach us: just EOF.
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());

        remote.await.unwrap();
    }
}
