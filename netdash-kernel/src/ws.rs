//! Flux WebSocket `/ws` : pousse `{"type":"update"}` à chaque changement.
//!
//! Aucune donnée n'est transportée, le client invalide ses requêtes
//! `/api/devices` et `/api/network/stats` puis refait un fetch.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::http::AppState;
use crate::notify::ChangeEvent;

pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, app))
}

async fn serve_socket(socket: WebSocket, app: AppState) {
    let mut changes = app.notifier.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(subscribers = app.notifier.subscriber_count(), "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) => {
                    if sender.send(Message::Text(event.to_json().into())).await.is_err() {
                        break;
                    }
                }
                // trop lent : un seul update suffit, le client refetch tout
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "websocket client lagging");
                    if sender.send(Message::Text(ChangeEvent::Update.to_json().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
            // texte client ignoré
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!("websocket client disconnected");
}
