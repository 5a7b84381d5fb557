//! The local SOCKS5 listener.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::proxy::tunnel::{self, TunnelContext};

/// Bind 127.0.0.1 on the configured port and serve tunnels until the
/// task is dropped.
///
/// A bind failure is fatal; accept failures are logged and the loop
/// continues. Each accepted connection gets its own tunnel task, so a
/// failing tunnel never disturbs its siblings.
pub async fn run(ctx: Arc<TunnelContext>) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", ctx.config().local_port)).await?;
    info!(
        "SOCKS5 listening on {} (method: {}, relay: {})",
        listener.local_addr()?,
        ctx.config().method,
        ctx.config().server_endpoint()
    );

    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                debug!("connection from {}", peer);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = tunnel::serve(ctx, client, peer).await {
                        if e.is_loud() {
                            error!("tunnel from {} failed: {}", peer, e);
                        } else {
                            debug!("tunnel from {} ended: {}", peer, e);
                        }
                    }
                });
            }
            Err(e) => {
                warn!("accept error: {}", e);
            }
        }
    }
}
