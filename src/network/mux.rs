//! The single-port connection multiplexer.
//!
//! One `TcpListener` serves both Raft peer traffic and the admin line
//! protocol. The first three bytes on every accepted connection select the
//! sub-protocol: `"rft"` is handed off (with those bytes already consumed)
//! to an unbuffered rendezvous channel that the Raft network layer reads
//! from; `"kv "` is dispatched straight to the admin handler. Anything
//! else — a short read, a read error, an unrecognized prefix — gets
//! `ERROR` written back (best-effort) and the connection is dropped. No
//! retry.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::admin::AdminHandler;
use crate::store::Store;

const PREFIX_LEN: usize = 3;
const RAFT_PREFIX: &[u8; PREFIX_LEN] = b"rft";
const ADMIN_PREFIX: &[u8; PREFIX_LEN] = b"kv ";
const SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

/// The listener-shaped handoff queue presented to the Raft network layer.
/// `Accept`-like semantics: `recv()` blocks until a `"rft"`-prefixed
/// connection arrives or the mux is closed, at which point it returns
/// `None` forever after.
#[derive(Clone)]
pub struct RaftIncoming {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<TcpStream>>>,
}

impl RaftIncoming {
    pub async fn accept(&self) -> Option<TcpStream> {
        self.rx.lock().await.recv().await
    }
}

/// Dial a peer's shared port for Raft traffic: open TCP, write the `"rft"`
/// header, hand back the connection.
pub async fn dial_raft(addr: &str) -> io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(RAFT_PREFIX).await?;
    Ok(stream)
}

pub struct Multiplexer {
    listener: TcpListener,
    raft_tx: mpsc::Sender<TcpStream>,
}

impl Multiplexer {
    /// Binds the shared port. Returns the multiplexer (to be `serve`d) and
    /// the `RaftIncoming` handle the consensus engine's network factory
    /// reads from.
    pub async fn bind(addr: SocketAddr) -> io::Result<(Self, RaftIncoming)> {
        let listener = TcpListener::bind(addr).await?;
        // Bounded to 1: an unbuffered rendezvous. A slow Raft-side consumer
        // applies backpressure to the accept loop's raft branch only —
        // admin connections are dispatched independently and are never
        // blocked by it.
        let (raft_tx, raft_rx) = mpsc::channel(1);
        let incoming = RaftIncoming {
            rx: Arc::new(tokio::sync::Mutex::new(raft_rx)),
        };
        Ok((Self { listener, raft_tx }, incoming))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop forever. Each accepted connection is sniffed
    /// and dispatched on its own task so a slow or malicious peer on one
    /// connection never blocks other accepts.
    pub async fn serve(self, store: Arc<Store>) {
        loop {
            let (conn, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "multiplexer accept failed");
                    continue;
                }
            };
            let raft_tx = self.raft_tx.clone();
            let store = store.clone();
            tokio::spawn(async move {
                handle_connection(conn, peer, raft_tx, store).await;
            });
        }
    }
}

async fn handle_connection(
    mut conn: TcpStream,
    peer: SocketAddr,
    raft_tx: mpsc::Sender<TcpStream>,
    store: Arc<Store>,
) {
    let mut prefix = [0u8; PREFIX_LEN];
    let sniff = tokio::time::timeout(SNIFF_TIMEOUT, read_exact_prefix(&mut conn, &mut prefix)).await;

    let ok = match sniff {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "error reading mux prefix");
            false
        }
        Err(_) => {
            debug!(%peer, "timed out waiting for mux prefix");
            false
        }
    };

    if !ok {
        let _ = conn.write_all(b"ERROR").await;
        return;
    }

    match &prefix {
        RAFT_PREFIX => {
            debug!(%peer, "handing connection to raft transport");
            if raft_tx.send(conn).await.is_err() {
                warn!(%peer, "raft transport closed, dropping connection");
            }
        }
        ADMIN_PREFIX => {
            debug!(%peer, "dispatching connection to admin handler");
            AdminHandler::new(store).handle(conn).await;
        }
        other => {
            warn!(%peer, prefix = ?other, "unknown mux prefix");
            let _ = conn.write_all(b"ERROR").await;
        }
    }
}

async fn read_exact_prefix(conn: &mut TcpStream, buf: &mut [u8; PREFIX_LEN]) -> io::Result<()> {
    use tokio::io::AsyncReadExt;
    conn.read_exact(buf).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_three_bytes() {
        assert_eq!(RAFT_PREFIX.len(), PREFIX_LEN);
        assert_eq!(ADMIN_PREFIX.len(), PREFIX_LEN);
        assert_eq!(ADMIN_PREFIX, b"kv ");
    }
}
