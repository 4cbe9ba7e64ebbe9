//! Live-view websocket and RFID reader endpoints

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::routes::lab_sessions::render_index;
use crate::AppState;

/// `GET /tag_ws`: live-view socket, or the index page for plain requests
pub async fn tag_ws(
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    match ws {
        Ok(ws) => Ok(ws.on_upgrade(move |socket| handle_socket(state, socket))),
        Err(_) => Ok(Html(render_index(&state)?).into_response()),
    }
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let client_id = state.tags.connect(tx);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(client_id, "Live-view socket error: {}", e);
                break;
            }
        }
    }

    // Dropping the registry's sender lets the writer drain and exit
    state.tags.disconnect(client_id);
    let _ = writer.await;
}

/// `GET /tag/events/in/:id`
pub async fn tag_in(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<String>,
) -> Result<StatusCode, AppError> {
    tracing::info!(tag = %tag_id, "Tag in");
    state.tags.tag_in(&state.db, &tag_id, Utc::now())?;
    Ok(StatusCode::OK)
}

/// `GET /tag/events/out/:id`
pub async fn tag_out(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<String>,
) -> Result<StatusCode, AppError> {
    tracing::info!(tag = %tag_id, "Tag out");
    match state.tags.tag_out(&state.db, &tag_id)? {
        Some(error) => Err(AppError::bad_request(error)),
        None => Ok(StatusCode::OK),
    }
}
