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
use crate::game::{MatchHandle, PlayerInput};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Display name, generated when absent
    pub name: Option<String>,
    /// Specific match to join, otherwise any open match
    pub match_id: Option<Uuid>,
    /// Split-screen seat
    #[serde(default)]
    pub local: bool,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let user_id = Uuid::new_v4();
    info!(user_id = %user_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Send welcome message
    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "Failed to send welcome");
        return;
    }

    let Some(handle) = state.match_registry.find_or_spawn(
        query.match_id,
        state.match_config.clone(),
        state.config.max_players_per_match,
        state.config.match_seed,
    ) else {
        warn!(user_id = %user_id, match_id = ?query.match_id, "Requested match not found");
        let _ = send_msg(
            &mut ws_sink,
            &ServerMsg::Error {
                code: "match_not_found".to_string(),
                message: "No such match".to_string(),
            },
        )
        .await;
        return;
    };

    // Subscribe before joining so the join confirmation is not missed
    let snapshot_rx = handle.snapshot_tx.subscribe();
    let join = PlayerInput {
        user_id,
        msg: ClientMsg::JoinMatch {
            match_id: Some(handle.id),
            display_name: query.name,
            local: query.local,
        },
        received_at: unix_millis(),
    };
    if handle.input_tx.send(join).await.is_err() {
        warn!(user_id = %user_id, match_id = %handle.id, "Match closed before join");
        return;
    }

    run_session(user_id, &handle, ws_sink, ws_stream, snapshot_rx).await;

    info!(user_id = %user_id, match_id = %handle.id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    user_id: Uuid,
    handle: &MatchHandle,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();
    let input_tx = handle.input_tx.clone();

    // Replies meant only for this session
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(16);

    // Spawn writer task: broadcasts and direct replies -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = direct_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
                received = snapshot_rx.recv() => match received {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(user_id = %user_id, lagged_count = n, "Client lagged, skipping {} messages", n);
                        // Continue - don't disconnect for lag
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(user_id = %user_id, "Match channel closed");
                        break;
                    }
                },
            };

            if msg.recipient().is_some_and(|id| id != user_id) {
                continue;
            }
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(user_id = %user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> match loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id = %user_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Ping { t }) => {
                        let _ = direct_tx.send(ServerMsg::Pong { t }).await;
                    }
                    Ok(client_msg) => {
                        let input = PlayerInput {
                            user_id,
                            msg: client_msg,
                            received_at: unix_millis(),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(user_id = %user_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                        let _ = direct_tx
                            .send(ServerMsg::Error {
                                code: "bad_message".to_string(),
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to match loop
    let _ = input_tx
        .send(PlayerInput {
            user_id,
            msg: ClientMsg::LeaveMatch,
            received_at: unix_millis(),
        })
        .await;

    // Abort writer task
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
