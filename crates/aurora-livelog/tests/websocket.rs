// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end: frames published on the bus arrive as JSON text messages on
//! a WebSocket client.

use aurora_livelog::{Frame, LiveLog, server};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_server(livelog: Arc<LiveLog>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, server::router(livelog)).await.unwrap();
    });

    format!("ws://{addr}")
}

async fn next_json(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
) -> serde_json::Value {
    loop {
        match stream.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn streams_status_and_log_frames() {
    let livelog = Arc::new(LiveLog::new());
    let url = spawn_server(Arc::clone(&livelog)).await;

    // Publish first so the topic exists and no empty_channel frame is sent.
    livelog.publish("foo", Frame::Status("processing".into()));

    let (mut socket, _) = connect_async(format!("{url}/?package=foo")).await.unwrap();

    livelog.publish("foo", Frame::Log("makepkg: compiling\n".into()));
    livelog.publish("foo", Frame::Status("success".into()));

    let first = next_json(&mut socket).await;
    assert_eq!(first["type"], "log");
    assert_eq!(first["data"], "makepkg: compiling\n");

    let second = next_json(&mut socket).await;
    assert_eq!(second["type"], "status");
    assert_eq!(second["data"], "success");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn fresh_topic_greets_with_empty_channel() {
    let livelog = Arc::new(LiveLog::new());
    let url = spawn_server(Arc::clone(&livelog)).await;

    let (mut socket, _) = connect_async(format!("{url}/?package=never-built"))
        .await
        .unwrap();

    let first = next_json(&mut socket).await;
    assert_eq!(first["type"], "empty_channel");
    assert!(first.get("data").is_none());

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn missing_package_parameter_is_rejected() {
    let livelog = Arc::new(LiveLog::new());
    let url = spawn_server(livelog).await;

    let err = connect_async(url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 400);
        }
        other => panic!("expected an HTTP 400 rejection, got {other:?}"),
    }
}
