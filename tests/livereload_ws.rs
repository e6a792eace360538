// Live-reload protocol over a real websocket

use futures_util::{SinkExt, Stream, StreamExt};
use ogs_dev::livereload::{reload_message, LiveReload, PROTOCOL};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[tokio::test]
async fn test_hello_then_reload() {
    let live_reload = LiveReload::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = live_reload.clone();
    tokio::spawn(async move { server.serve_on(listener).await });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/livereload", addr))
        .await
        .unwrap();
    ws.send(Message::Text(
        serde_json::json!({"command": "hello", "protocols": [PROTOCOL]}).to_string(),
    ))
    .await
    .unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["command"], "hello");
    assert_eq!(hello["serverName"], "ogs-dev");
    assert_eq!(live_reload.client_count(), 1);

    assert_eq!(live_reload.reload("ogs.css"), 1);
    let reload = next_json(&mut ws).await;
    let expected: serde_json::Value = serde_json::from_str(&reload_message("ogs.css")).unwrap();
    assert_eq!(reload, expected);
    assert_eq!(reload["liveCSS"], true);
}

#[tokio::test]
async fn test_changed_endpoint_reaches_websocket_clients() {
    let live_reload = LiveReload::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = live_reload.clone();
    tokio::spawn(async move { server.serve_on(listener).await });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/livereload", addr))
        .await
        .unwrap();
    ws.send(Message::Text("{\"command\":\"hello\"}".to_string())).await.unwrap();
    next_json(&mut ws).await;

    let resp = reqwest::get(format!("http://{}/changed?files=ogs.js", addr)).await.unwrap();
    assert!(resp.status().is_success());

    let reload = next_json(&mut ws).await;
    assert_eq!(reload["command"], "reload");
    assert_eq!(reload["path"], "ogs.js");
}
