//! Per-connection lifecycle: line framing, the request queue, and the
//! serialized request pump.
//!
//! Three tasks per connection: a reader that turns bytes into complete
//! lines and queues them, a pump that handles queued requests one at a
//! time, and a writer that drains the outbound frame channel. Incoming
//! lines keep queueing while a handler is suspended on the store; replies
//! stay in lockstep with requests.

use std::sync::Arc;

use {
    futures::{SinkExt, StreamExt},
    serde_json::json,
    tokio::{
        io::{AsyncRead, AsyncWrite},
        sync::{mpsc, watch},
    },
    tokio_util::codec::{Framed, LinesCodec},
    tracing::{debug, info},
};

use comcore_protocol::{Frame, MAX_LINE_BYTES, events};

use crate::{dispatch, sessions::ConnHandle, state::ServerState};

/// Drive one connection to completion: until the peer closes, an I/O error
/// occurs, or the server shuts down.
pub async fn run_connection<S>(
    stream: S,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "connection open");

    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let (mut sink, mut lines) = framed.split();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let conn = ConnHandle::new(conn_id.clone(), frame_tx);

    // Write loop: one task owns the sink; everyone else queues frames.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(line) = frame_rx.recv().await {
            if sink.send(line).await.is_err() {
                debug!(conn_id = %write_conn_id, "write loop closed");
                break;
            }
        }
    });

    // Reader: queue complete non-empty lines while the pump is busy.
    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<String>();
    let read_conn_id = conn_id.clone();
    let read_handle = tokio::spawn(async move {
        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if req_tx.send(line).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    debug!(conn_id = %read_conn_id, error = %e, "read error");
                    break;
                },
            }
        }
    });

    // Request pump: at most one in-flight request per connection.
    loop {
        tokio::select! {
            line = req_rx.recv() => {
                let Some(line) = line else {
                    break;
                };
                dispatch::handle_line(&state, &conn, &line).await;
            },
            _ = shutdown.changed() => {
                conn.send(&Frame::push(events::END, json!({})));
                break;
            },
        }
    }

    // Cleanup: deregister, then let the writer drain what is queued.
    if let Some(user_id) = conn.user_id() {
        state.sessions.logout_connection(user_id, &conn_id).await;
    }
    read_handle.abort();
    drop(conn);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), write_handle).await;
    info!(conn_id = %conn_id, "connection closed");
}
