use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use super::KitchenEvent;
use crate::state::AppState;

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/inventory", get(inventory_socket))
}

async fn inventory_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // subscribe before the upgrade so nothing published in between is lost
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, rx))
}

async fn stream_events(socket: WebSocket, mut rx: broadcast::Receiver<KitchenEvent>) {
    info!("inventory subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(t) => t,
                        Err(e) => {
                            error!(error = %e, "serialize event failed");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "inventory subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // client frames are ignored; we only watch for the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!("inventory subscriber disconnected");
}
