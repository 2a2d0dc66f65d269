use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use futures::{SinkExt, StreamExt};
use service_core::realtime::{RealtimeMessage, SessionProjection};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::handshake::{presented_session_id, resolve_session, HandshakeError, HandshakeQuery};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::AppState;

/// GET /ws
///
/// The session is checked before the upgrade so a rejected client gets a
/// plain HTTP answer it can act on.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    jar: CookieJar,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, HandshakeError> {
    let session_id = presented_session_id(&query, &jar)?;
    let projection = resolve_session(state.cache.as_ref(), session_id).await?;

    let Some(ws) = ws else {
        return Ok((
            StatusCode::UPGRADE_REQUIRED,
            Json(serde_json::json!({ "error": "WebSocket upgrade required" })),
        )
            .into_response());
    };

    let registry = state.registry.clone();
    let buffer = state.config.delivery.outbound_buffer;
    Ok(ws.on_upgrade(move |socket| run_connection(socket, registry, projection, buffer)))
}

async fn run_connection(
    socket: WebSocket,
    registry: Arc<dyn ConnectionRegistry>,
    projection: SessionProjection,
    buffer: usize,
) {
    let user_id = projection.user_id;
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(buffer);

    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.connection_id();
    registry.register(user_id, handle.clone());
    tracing::info!(
        user_id = %user_id,
        session_id = %projection.session_id,
        connection_id = %connection_id,
        "Client connected"
    );

    // Replies and deliveries share one writer so frames never interleave
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                tracing::debug!(error = %e, "Write to client failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(received) = stream.next().await {
        let text = match received {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Read from client failed");
                break;
            }
        };

        let frame: RealtimeMessage = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Skipping malformed frame");
                continue;
            }
        };

        let reply = match serde_json::to_string(&reply_for(&frame)) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize reply");
                continue;
            }
        };

        if let Err(e) = handle.push(reply) {
            tracing::warn!(connection_id = %connection_id, error = %e, "Reply dropped");
            break;
        }
    }

    registry.unregister_connection(user_id, connection_id);
    drop(handle);
    let _ = writer.await;

    tracing::info!(user_id = %user_id, connection_id = %connection_id, "Client disconnected");
}

/// Synchronous answer to a client frame.
pub fn reply_for(frame: &RealtimeMessage) -> RealtimeMessage {
    let (kind, prefix) = match frame.kind.as_str() {
        "notice" => ("notice", "Received: "),
        "bye" => ("bye", "Goodbye: "),
        "ping" => ("ping", "Pong: "),
        _ => ("echo", "Echo: "),
    };

    RealtimeMessage::new(kind, format!("{}{}", prefix, frame.message), "")
}
