//! Worker-pool accept strategy on top of a tokio reactor.
//!
//! One multi-threaded runtime sized by `network.workers` runs the accept
//! loop plus two tasks per connection: a reader driving the state machine
//! and a writer draining the outbound queue. The same frame processing runs
//! here as under the blocking strategy; only the scheduling differs, so a
//! small worker pool serves many idle connections.

use crate::broker::SendHandle;
use crate::connection::{Connection, FeedOutcome};
use crate::error::ServerError;
use crate::server::Server;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

/// Send handle backed by the connection's writer task.
struct TaskSendHandle {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl SendHandle for TaskSendHandle {
    fn send(&self, bytes: Bytes) -> bool {
        self.tx.send(bytes).is_ok()
    }
}

/// Builds the runtime and runs the accept loop until a shutdown signal.
pub(crate) fn serve(server: &Server) -> Result<(), ServerError> {
    let workers = server.config().network.workers.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("stompd-worker")
        .enable_all()
        .build()?;

    let std_listener = server.listener().try_clone()?;
    std_listener.set_nonblocking(true)?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::from_std(std_listener)?;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if server.at_capacity() {
                            tracing::warn!(%peer, "rejecting connection, at capacity");
                            continue;
                        }
                        tracing::info!(%peer, "client connected");
                        accept_connection(server, stream);
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received");
                    return Ok(());
                }
            }
        }
    })
}

fn accept_connection(server: &Server, stream: tokio::net::TcpStream) {
    let id = server.allocate_connection_id();
    let (read_half, write_half) = stream.into_split();

    // Register before the reader task starts so the first CONNECTED frame
    // always finds a live handle.
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    server.broker().register(id, Arc::new(TaskSendHandle { tx }));

    let conn = server.new_connection(id);
    let stats = server.stats().clone();
    stats.connection_opened();

    tokio::spawn(writer_task(write_half, rx));
    tokio::spawn(async move {
        reader_task(conn, read_half).await;
        stats.connection_closed();
        tracing::info!(connection = id, "connection closed");
    });
}

async fn reader_task(mut conn: Connection, mut read_half: OwnedReadHalf) {
    let mut buf = [0u8; 4096];
    loop {
        match read_half.read(&mut buf).await {
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
    // Dropping the registry's handle closes the writer's channel; the writer
    // flushes whatever is queued and exits.
    conn.finish();
}

/// Drains the outbound queue onto the socket. Exits when every sender is
/// dropped or the peer stops accepting bytes.
async fn writer_task(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = write_half.write_all(&bytes).await {
            tracing::debug!(error = %e, "write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
