//! Live-reload server speaking the LiveReload 7 protocol.
//!
//! Browsers load `/livereload.js`, open a websocket on `/livereload` and
//! receive `reload` commands whenever a rebuild finishes. Reloads can also
//! be triggered over HTTP via `/changed?files=a.css,b.js`.

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub const PROTOCOL: &str = "http://livereload.com/protocols/official-7";
const SERVER_NAME: &str = "ogs-dev";

const CLIENT_JS: &str = r#"(function () {
  var script = document.currentScript;
  var origin = script ? new URL(script.src) : window.location;
  var url = (origin.protocol === "https:" ? "wss://" : "ws://") + origin.host + "/livereload";
  function refreshCss(path) {
    var name = path.split("/").pop();
    var links = document.querySelectorAll("link[rel=stylesheet]");
    var hit = false;
    Array.prototype.forEach.call(links, function (link) {
      var href = link.href.split("?")[0];
      if (href.split("/").pop().indexOf(name.replace(/\.css$/, "")) === 0) {
        link.href = href + "?livereload=" + Date.now();
        hit = true;
      }
    });
    if (!hit) { window.location.reload(); }
  }
  function connect() {
    var ws = new WebSocket(url);
    ws.onopen = function () {
      ws.send(JSON.stringify({ command: "hello", protocols: ["http://livereload.com/protocols/official-7"] }));
    };
    ws.onmessage = function (ev) {
      var msg = JSON.parse(ev.data);
      if (msg.command !== "reload") { return; }
      if (msg.liveCSS && /\.css$/.test(msg.path)) { refreshCss(msg.path); } else { window.location.reload(); }
    };
    ws.onclose = function () { setTimeout(connect, 1000); };
  }
  connect();
})();
"#;

#[derive(Debug, Clone, PartialEq)]
pub struct ReloadEvent {
    pub path: String,
}

/// Handle shared by everything that wants to trigger a browser reload.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<ReloadEvent>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Push a reload for `path` to every connected browser. Returns how many
    /// clients were listening.
    pub fn reload(&self, path: &str) -> usize {
        let clients = self.tx.send(ReloadEvent { path: path.to_string() }).unwrap_or(0);
        tracing::info!(path, clients, "live reload");
        clients
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(welcome))
            .route("/livereload", get(upgrade))
            .route("/livereload.js", get(client_script))
            .route("/changed", get(changed).post(changed))
            .with_state(self.clone())
    }

    pub async fn serve(&self, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind live-reload port {}", port))?;
        tracing::info!(port, "live-reload server listening");
        self.serve_on(listener).await
    }

    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router())
            .await
            .context("live-reload server failed")
    }
}

pub fn hello_message() -> String {
    json!({
        "command": "hello",
        "protocols": [PROTOCOL],
        "serverName": SERVER_NAME,
    })
    .to_string()
}

pub fn reload_message(path: &str) -> String {
    json!({
        "command": "reload",
        "path": path,
        "liveCSS": true,
    })
    .to_string()
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "ogs-dev": "Welcome", "version": env!("CARGO_PKG_VERSION") }))
}

async fn client_script() -> Response {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        CLIENT_JS,
    )
        .into_response()
}

async fn upgrade(ws: WebSocketUpgrade, State(lr): State<LiveReload>) -> Response {
    let rx = lr.subscribe();
    ws.on_upgrade(move |socket| client_loop(socket, rx))
}

#[derive(Deserialize)]
struct ClientCommand {
    command: String,
}

async fn client_loop(mut socket: WebSocket, mut rx: broadcast::Receiver<ReloadEvent>) {
    tracing::debug!("live-reload client connected");
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "live-reload client error");
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => {
                        let Ok(cmd) = serde_json::from_str::<ClientCommand>(text.as_str()) else {
                            continue;
                        };
                        if cmd.command == "hello"
                            && socket.send(Message::Text(hello_message().into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let frame = Message::Text(reload_message(&event.path).into());
                        if socket.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "live-reload client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    tracing::debug!("live-reload client disconnected");
}

#[derive(Deserialize, Default)]
struct ChangedBody {
    #[serde(default)]
    files: Vec<String>,
}

async fn changed(
    State(lr): State<LiveReload>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<serde_json::Value> {
    let mut files: Vec<String> = query
        .get("files")
        .map(|f| f.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
        .unwrap_or_default();
    if !body.is_empty() {
        if let Ok(parsed) = serde_json::from_slice::<ChangedBody>(&body) {
            files.extend(parsed.files);
        }
    }

    let mut clients = 0;
    for file in &files {
        clients = lr.reload(file);
    }
    Json(json!({ "clients": clients, "files": files }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_messages() {
        let hello: serde_json::Value = serde_json::from_str(&hello_message()).unwrap();
        assert_eq!(hello["command"], "hello");
        assert_eq!(hello["protocols"][0], PROTOCOL);

        let reload: serde_json::Value = serde_json::from_str(&reload_message("ogs.css")).unwrap();
        assert_eq!(reload, json!({"command": "reload", "path": "ogs.css", "liveCSS": true}));
    }

    #[test]
    fn test_reload_without_clients() {
        let lr = LiveReload::new();
        assert_eq!(lr.reload("ogs.css"), 0);
        let mut rx = lr.subscribe();
        assert_eq!(lr.reload("ogs.css"), 1);
        assert_eq!(rx.try_recv().unwrap().path, "ogs.css");
    }

    #[tokio::test]
    async fn test_changed_endpoint_broadcasts() {
        let lr = LiveReload::new();
        let mut rx = lr.subscribe();

        let resp = lr
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/changed?files=ogs.css,index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["files"], json!(["ogs.css", "index.html"]));

        assert_eq!(rx.recv().await.unwrap().path, "ogs.css");
        assert_eq!(rx.recv().await.unwrap().path, "index.html");
    }

    #[tokio::test]
    async fn test_client_script_served() {
        let resp = LiveReload::new()
            .router()
            .oneshot(Request::get("/livereload.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/javascript");
    }
}
