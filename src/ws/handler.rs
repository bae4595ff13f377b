//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::craft::{sanitize_name, CraftId};
use crate::game::world::DEFAULT_CRAFT_NAME;
use crate::game::{CraftInput, InputEvent};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Targeted messages queued per connection
const DIRECT_CHANNEL_CAPACITY: usize = 64;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name chosen by the player
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let name = sanitize_name(query.name.as_deref(), DEFAULT_CRAFT_NAME);
    ws.on_upgrade(move |socket| handle_socket(socket, name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, name: String, state: AppState) {
    let craft_id = Uuid::new_v4();
    info!(craft_id = %craft_id, name = %name, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        craft_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(craft_id = %craft_id, error = %e, "Failed to send welcome");
        return;
    }

    // Subscribe and register before the craft exists so nothing is missed
    let snapshot_rx = state.world.snapshot_tx.subscribe();
    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);
    state.world.connections.register(craft_id, direct_tx);

    let input_tx = state.world.input_tx.clone();
    let connected = CraftInput {
        craft_id,
        event: InputEvent::Connected { name },
        received_at: unix_millis(),
    };

    if input_tx.send(connected).await.is_ok() {
        run_session(craft_id, ws_sink, ws_stream, &input_tx, direct_rx, snapshot_rx).await;
    } else {
        error!(craft_id = %craft_id, "World simulation is not running");
    }

    // Cleanup on disconnect
    state.world.connections.unregister(&craft_id);
    let _ = input_tx
        .send(CraftInput {
            craft_id,
            event: InputEvent::Disconnected,
            received_at: unix_millis(),
        })
        .await;

    info!(craft_id = %craft_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    craft_id: CraftId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: &mpsc::Sender<CraftInput>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let mut rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: targeted messages and broadcast snapshots -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => {
                        debug!(craft_id = %craft_id, "Direct channel closed");
                        break;
                    }
                },
                broadcast = snapshot_rx.recv() => match broadcast {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            craft_id = %craft_id,
                            lagged_count = n,
                            "Client lagged, skipping {} snapshots", n
                        );
                        // Continue - don't disconnect for lag
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(craft_id = %craft_id, "Snapshot channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(craft_id = %craft_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> world
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(
                        craft_id = %craft_id,
                        dropped = rate_limiter.dropped(),
                        "Rate limited input message"
                    );
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let input = CraftInput {
                            craft_id,
                            event: InputEvent::Message(client_msg),
                            received_at: unix_millis(),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(craft_id = %craft_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(craft_id = %craft_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(craft_id = %craft_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(craft_id = %craft_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(craft_id = %craft_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
