//! Thread-per-connection accept strategy.
//!
//! Every accepted socket gets two OS threads: a reader that blocks on the
//! socket and drives the connection's state machine, and a writer that drains
//! the connection's outbound queue. The send handle registered with the
//! broker is the queue's sender, so broadcasts from any thread only ever
//! enqueue bytes and never touch the socket directly.

use crate::broker::SendHandle;
use crate::connection::{Connection, FeedOutcome};
use crate::error::ServerError;
use crate::server::Server;
use bytes::Bytes;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;

/// Send handle backed by a std mpsc channel to the connection's writer
/// thread. The sender is mutex-wrapped because `mpsc::Sender` is not `Sync`.
struct ChannelSendHandle {
    tx: parking_lot::Mutex<mpsc::Sender<Bytes>>,
}

impl SendHandle for ChannelSendHandle {
    fn send(&self, bytes: Bytes) -> bool {
        self.tx.lock().send(bytes).is_ok()
    }
}

/// Accept loop for the blocking strategy. Runs on the caller's thread and
/// never returns except on a listener-level fault.
pub(crate) fn serve(server: &Server) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = match server.listener().accept() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        if server.at_capacity() {
            tracing::warn!(%peer, "rejecting connection, at capacity");
            drop(stream);
            continue;
        }
        if let Err(e) = spawn_connection(server, stream) {
            tracing::warn!(%peer, error = %e, "failed to start connection threads");
        } else {
            tracing::info!(%peer, "client connected");
        }
    }
}

fn spawn_connection(server: &Server, stream: TcpStream) -> std::io::Result<()> {
    let id = server.allocate_connection_id();
    let write_stream = stream.try_clone()?;

    // Register before the reader starts so the first CONNECTED frame always
    // finds a live handle.
    let (tx, rx) = mpsc::channel::<Bytes>();
    server.broker().register(
        id,
        Arc::new(ChannelSendHandle {
            tx: parking_lot::Mutex::new(tx),
        }),
    );

    std::thread::Builder::new()
        .name(format!("stompd-wr-{id}"))
        .spawn(move || writer_loop(write_stream, rx))?;

    let mut conn = server.new_connection(id);
    let stats = server.stats().clone();
    stats.connection_opened();
    let spawned = std::thread::Builder::new()
        .name(format!("stompd-conn-{id}"))
        .spawn(move || {
            reader_loop(&mut conn, &stream);
            conn.finish();
            // The registry entry held the last sender clone; finish() dropped
            // it, so the writer drains its queue and exits on its own.
            let _ = stream.shutdown(Shutdown::Read);
            stats.connection_closed();
            tracing::info!(connection = id, "connection closed");
        });
    if let Err(e) = spawned {
        server.broker().disconnect(id);
        server.stats().connection_closed();
        return Err(e);
    }
    Ok(())
}

fn reader_loop(conn: &mut Connection, stream: &TcpStream) {
    let mut stream = stream;
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if conn.feed(&buf[..n]) == FeedOutcome::Closed {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(connection = conn.connection_id(), error = %e, "read failed");
                break;
            }
        }
    }
}

/// Drains the outbound queue onto the socket. Exits when every sender is
/// dropped or the peer stops accepting bytes.
fn writer_loop(mut stream: TcpStream, rx: mpsc::Receiver<Bytes>) {
    while let Ok(bytes) = rx.recv() {
        if let Err(e) = stream.write_all(&bytes) {
            tracing::debug!(error = %e, "write failed");
            break;
        }
    }
    let _ = stream.shutdown(Shutdown::Write);
}
