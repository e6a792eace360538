//! Development HTTP server: static output, prefix proxy to the remote
//! origin, locale bundles, and the SPA entry page for everything else.

pub mod locale;
pub mod proxy;
pub mod spa;

use crate::config::{Config, ProxyConfig};
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub prefix: String,
    pub origin: String,
    pub remote_prefix: String,
}

/// Ordered prefix routes; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<ProxyRoute>,
}

impl RouteTable {
    pub fn new(routes: Vec<ProxyRoute>) -> Self {
        Self { routes }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|r| ProxyRoute {
                prefix: r.prefix.clone(),
                origin: r.origin.clone().unwrap_or_else(|| config.origin.clone()),
                remote_prefix: r.remote_prefix.clone().unwrap_or_else(|| r.prefix.clone()),
            })
            .collect();
        Self { routes }
    }

    pub fn routes(&self) -> &[ProxyRoute] {
        &self.routes
    }

    /// Match a request path (query included) and build the upstream path.
    ///
    /// `/oauth2/callback?x=1` under prefix `/oauth2` becomes
    /// `<remote_prefix>/callback?x=1`; the bare prefix maps to
    /// `<remote_prefix>/`.
    pub fn resolve(&self, path_and_query: &str) -> Option<(&ProxyRoute, String)> {
        self.routes.iter().find_map(|route| {
            let rest = path_and_query.strip_prefix(route.prefix.as_str())?;
            if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
                return None;
            }
            let suffix = if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{}", rest)
            };
            Some((route, format!("{}{}", route.remote_prefix, suffix)))
        })
    }
}

/// Shared per-server state handed to every dynamic handler.
#[derive(Clone)]
pub struct DevState {
    pub config: Arc<Config>,
    pub routes: Arc<RouteTable>,
    pub client: reqwest::Client,
}

impl DevState {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            routes: Arc::new(RouteTable::from_config(&config.proxy)),
            config: Arc::new(config),
            client,
        })
    }
}

/// Static dirs are tried in order; whatever they miss goes to [`dispatch`].
pub fn router(state: DevState) -> Router {
    let static_dirs = state.config.server.static_dirs.clone();
    let mut app = Router::new().fallback(dispatch).with_state(state);
    for dir in static_dirs.iter().rev() {
        let serve = ServeDir::new(dir)
            .call_fallback_on_method_not_allowed(true)
            .fallback(app);
        app = Router::new().fallback_service(serve);
    }
    app.layer(TraceLayer::new_for_http())
}

async fn dispatch(State(state): State<DevState>, req: Request) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    if let Some((route, upstream_path)) = state.routes.resolve(&path_and_query) {
        return proxy::forward(&state.client, route, &upstream_path, req).await;
    }

    let head = match *req.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    let path = req.uri().path();
    let response = if locale::matches(&state.config.locale.prefix, path) {
        locale::fetch(&state.client, &state.config.locale.origin, path).await
    } else {
        spa::index(&state, req.headers(), path).await
    };

    // HEAD keeps the GET headers, Content-Length included, without the body.
    if head {
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Body::empty());
    }
    response
}

pub async fn serve(config: Config) -> Result<()> {
    let port = config.server.port;
    let public_host = config.server.public_host.clone();
    let state = DevState::new(config)?;

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind dev server port {}", port))?;
    print_banner(&public_host, port);
    tracing::info!(port, "dev server listening");

    axum::serve(listener, router(state))
        .await
        .context("dev server failed")
}

fn print_banner(host: &str, port: u16) {
    let url = format!("http://{}:{}", host, port);
    let title = format!("Development server started on port {}", port);
    let width = title.len().max(url.len()) + 6;
    let rule = "#".repeat(width);
    println!("{}", rule);
    println!("## {:^w$} ##", title, w = width - 6);
    println!("## {:^w$} ##", url, w = width - 6);
    println!("{}", rule);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    fn route(prefix: &str, remote: &str) -> ProxyRoute {
        ProxyRoute {
            prefix: prefix.to_string(),
            origin: "https://beta.online-go.com".to_string(),
            remote_prefix: remote.to_string(),
        }
    }

    #[test]
    fn test_resolve_rewrites_prefix() {
        let table = RouteTable::new(vec![route("/oauth2", "/remote/oauth2"), route("/api", "/api")]);
        let (r, path) = table.resolve("/oauth2/callback").unwrap();
        assert_eq!(r.prefix, "/oauth2");
        assert_eq!(path, "/remote/oauth2/callback");

        let (_, path) = table.resolve("/api/v1/ui/config?x=1&y=2").unwrap();
        assert_eq!(path, "/api/v1/ui/config?x=1&y=2");
    }

    #[test]
    fn test_resolve_bare_prefix() {
        let table = RouteTable::new(vec![route("/api", "/api")]);
        assert_eq!(table.resolve("/api").unwrap().1, "/api/");
        assert_eq!(table.resolve("/api?q=1").unwrap().1, "/api/?q=1");
    }

    #[test]
    fn test_resolve_requires_segment_boundary() {
        let table = RouteTable::new(vec![route("/api", "/api")]);
        assert!(table.resolve("/apiary").is_none());
        assert!(table.resolve("/not-configured").is_none());
        assert!(table.resolve("/").is_none());
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let table = RouteTable::new(vec![route("/api", "/first"), route("/api/v1", "/second")]);
        assert_eq!(table.resolve("/api/v1/me").unwrap().1, "/first/v1/me");
    }

    #[test]
    fn test_from_config_defaults() {
        let config = ProxyConfig {
            origin: "https://origin.example".to_string(),
            routes: vec![
                RouteConfig {
                    prefix: "/sso".to_string(),
                    origin: None,
                    remote_prefix: None,
                },
                RouteConfig {
                    prefix: "/x".to_string(),
                    origin: Some("http://other".to_string()),
                    remote_prefix: Some("/y".to_string()),
                },
            ],
        };
        let table = RouteTable::from_config(&config);
        assert_eq!(
            table.routes(),
            &[
                ProxyRoute {
                    prefix: "/sso".to_string(),
                    origin: "https://origin.example".to_string(),
                    remote_prefix: "/sso".to_string(),
                },
                ProxyRoute {
                    prefix: "/x".to_string(),
                    origin: "http://other".to_string(),
                    remote_prefix: "/y".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_default_table_has_all_routes() {
        let table = RouteTable::from_config(&ProxyConfig::default());
        assert_eq!(table.routes().len(), 8);
        assert!(table.resolve("/OGSScoreEstimator/score.js").is_some());
        assert!(table.resolve("/termination-api/foo").is_some());
    }
}
