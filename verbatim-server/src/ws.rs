//! WebSocket endpoint: upgrade, outbound forwarder, reader loop.
//!
//! Each socket gets one [`Session`] (the controller from verbatim-core), an
//! unbounded outbound channel, and a forwarder task that serialises
//! `ServerMessage`s onto the sink. The reader loop dispatches frames in
//! arrival order; the controller parks slow work off the control path so
//! the loop keeps draining the socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use verbatim_core::{ClientMessage, ServerMessage, Session};

use crate::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let mut session = Session::new(
        state.session_config.clone(),
        Arc::clone(&state.manager),
        state.pipeline.clone(),
        out_tx,
    );
    let session_id = session.id();
    state.registry.insert(session_id);

    // Forwarder: owns the sink and serialises every outbound message, so
    // replies leave in the order their operations completed.
    let forwarder = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                // Peer went away; the reader loop observes the close.
                break;
            }
        }
    });

    session.connect();

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session = %session_id, error = %e, "transport error, closing session");
                break;
            }
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => session.handle(message).await,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "unparseable client message");
                    session.report_error(format!("Invalid message: {e}"));
                }
            },
            Message::Binary(_) => {
                warn!(session = %session_id, "binary frame ignored — protocol is JSON text");
                session.report_error("Expected JSON text messages");
            }
            Message::Close(_) => {
                debug!(session = %session_id, "close frame received");
                break;
            }
            // axum answers pings at the protocol level.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    session.close();
    state.registry.remove(&session_id);
    // Results for a closed session are discarded, never delivered late.
    forwarder.abort();
}
