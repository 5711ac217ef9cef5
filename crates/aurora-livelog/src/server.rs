// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-builder WebSocket endpoint.
//!
//! `GET /?package=<name>` upgrades to a WebSocket and forwards the
//! package's live-log frames as one JSON object per text message until the
//! client disconnects.

use crate::{Frame, LiveLog};
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(default)]
    package: String,
}

/// Build the router serving the live-log endpoint.
pub fn router(livelog: Arc<LiveLog>) -> Router {
    Router::new()
        .route("/", get(handle_stream))
        .with_state(livelog)
}

async fn handle_stream(
    State(livelog): State<Arc<LiveLog>>,
    Query(query): Query<StreamQuery>,
    upgrade: WebSocketUpgrade,
) -> Response {
    if query.package.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let package = query.package;
    upgrade.on_upgrade(move |socket| stream_frames(livelog, package, socket))
}

async fn stream_frames(livelog: Arc<LiveLog>, package: String, mut socket: WebSocket) {
    let (mut subscription, exists) = livelog.subscribe(&package);

    debug!(package, exists, "live-log subscriber connected");

    if !exists && send_frame(&mut socket, &Frame::EmptyChannel).await.is_err() {
        return;
    }

    while let Some(frame) = subscription.recv().await {
        if send_frame(&mut socket, &frame).await.is_err() {
            break;
        }
    }

    trace!(package, "live-log subscriber disconnected");
    // Dropping the subscription unsubscribes.
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame)
        .map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}
