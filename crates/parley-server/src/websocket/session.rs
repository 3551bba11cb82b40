//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::MessageRouter;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::protocol::TEST_ENDPOINT_REPLY;

/// Run a chat session for a connected client.
///
/// 1. Registers the connection (unauthenticated) with the session registry
/// 2. Forwards queued outbound text through a dedicated write task
/// 3. Routes each inbound text frame through the [`MessageRouter`], in order
/// 4. Deregisters on disconnect, close request, or server shutdown
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: String,
    router: Arc<MessageRouter>,
    queue_capacity: usize,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));
    let sessions = Arc::clone(router.sessions());

    if !sessions.add(connection.clone()).await {
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    info!(client_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let close = connection.close_token();
    let writer_close = close.clone();
    let outbound = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_close.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = close.cancelled() => break,
            () = shutdown.cancelled() => {
                connection.close();
                break;
            }
        };
        let Some(Ok(msg)) = msg else { break };

        let Some(text) = frame_text(&client_id, msg) else {
            continue;
        };
        let _ = router.handle_message(&connection, &text).await;
    }

    if let Some(identity) = connection.identity() {
        info!(client_id, identity = %identity, "user disconnected");
    } else {
        info!(client_id, "client disconnected");
    }
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

    let _ = sessions.remove(&client_id).await;
    // Let the writer flush a pending close frame before tearing it down.
    if connection.is_closing() {
        let _ = outbound.await;
    } else {
        outbound.abort();
    }
}

/// Run the legacy test endpoint: every text frame is answered with a fixed
/// reply. No registration, no authentication.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_test_session(mut ws: WebSocket, client_id: String, shutdown: CancellationToken) {
    debug!(client_id, "test client connected");
    loop {
        let msg = tokio::select! {
            msg = ws.recv() => msg,
            () = shutdown.cancelled() => {
                let _ = ws.send(Message::Close(None)).await;
                break;
            }
        };
        let Some(Ok(msg)) = msg else { break };
        if frame_text(&client_id, msg).is_none() {
            continue;
        }
        if ws.send(Message::Text(TEST_ENDPOINT_REPLY.into())).await.is_err() {
            break;
        }
    }
    debug!(client_id, "test client disconnected");
}

/// Extract text from a Text frame, or from a Binary frame holding UTF-8.
fn frame_text(client_id: &str, msg: Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.to_string()),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(s) => Some(s),
            Err(_) => {
                warn!(client_id, len = data.len(), "received non-UTF8 binary frame");
                None
            }
        },
        Message::Close(_) => {
            debug!(client_id, "client sent close frame");
            None
        }
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
