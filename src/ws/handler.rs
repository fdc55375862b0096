//! WebSocket upgrade handlers
//!
//! One upgrade route per game namespace, all funneling into the same
//! generic socket loop. The socket side only parses frames and shuttles
//! them to the game task; every game rule lives on the other side of the
//! command channel.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameHandle, GatewayCmd, OUT_CHANNEL_CAPACITY};
use crate::util::rate_limit::ConnRateLimiter;

/// WebSocket upgrade handler for the pong namespace
pub async fn pong_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.pong.clone()))
}

/// WebSocket upgrade handler for the snake namespace
pub async fn snake_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.snake.clone()))
}

/// WebSocket upgrade handler for the flappy namespace
pub async fn flappy_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.flappy.clone()))
}

/// Handle one upgraded WebSocket connection against its game task
async fn handle_socket<C, S>(socket: WebSocket, game: GameHandle<C, S>)
where
    C: DeserializeOwned + Send + 'static,
    S: Serialize + Send + Sync + 'static,
{
    let conn = Uuid::new_v4();
    info!(conn = %conn, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Register with the game task; it answers over this outbound channel
    let (out_tx, mut out_rx) = mpsc::channel::<S>(OUT_CHANNEL_CAPACITY);
    if game
        .send(GatewayCmd::Connect {
            conn,
            sender: out_tx,
        })
        .await
        .is_err()
    {
        error!(conn = %conn, "Game task unavailable, dropping connection");
        return;
    }

    // Spawn writer task: game frames -> WebSocket
    let writer_conn = conn;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn = %writer_conn, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> game task
    let rate_limiter = ConnRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_intent() {
                    warn!(conn = %conn, "Rate limited intent message");
                    continue;
                }

                match serde_json::from_str::<C>(&text) {
                    Ok(msg) => {
                        if game.send(GatewayCmd::Intent { conn, msg }).await.is_err() {
                            debug!(conn = %conn, "Game task gone");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn = %conn, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn = %conn, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(conn = %conn, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(conn = %conn, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(conn = %conn, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn = %conn, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect so the game vacates the session, then stop writing
    let _ = game.send(GatewayCmd::Disconnect { conn }).await;
    writer_handle.abort();

    info!(conn = %conn, "WebSocket connection closed");
}

/// Send a message over WebSocket
async fn send_msg<S: Serialize>(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &S,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{
        FlappyClientMsg, FlappyServerMsg, PongClientMsg, PongServerMsg, SnakeClientMsg,
        SnakeServerMsg,
    };

    // The writer task holds a borrowed frame across an await inside
    // tokio::spawn, so outbound message types must be shareable between
    // threads. Instantiating the loop per namespace pins that down.
    #[test]
    fn test_socket_loop_accepts_each_game_protocol() {
        let _ = handle_socket::<PongClientMsg, PongServerMsg>;
        let _ = handle_socket::<SnakeClientMsg, SnakeServerMsg>;
        let _ = handle_socket::<FlappyClientMsg, FlappyServerMsg>;
    }
}
