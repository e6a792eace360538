use super::DevState;
use crate::config::Config;
use crate::template::{PlaceholderTable, RequestContext};
use anyhow::{Context, Result};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

/// Hostname from the `Host` header without its port.
pub fn hostname(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let name = if host.starts_with('[') {
        // [v6]:port
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or("")
    };
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name.to_string()
    }
}

/// Template and languages are read on every request so edits show up
/// without a restart.
pub async fn render_index(config: &Config, hostname: &str) -> Result<String> {
    let template = tokio::fs::read_to_string(&config.template.index)
        .await
        .with_context(|| format!("failed to read {}", config.template.index.display()))?;
    let languages = tokio::fs::read_to_string(&config.template.languages)
        .await
        .with_context(|| format!("failed to read {}", config.template.languages.display()))?;
    let supported_languages: serde_json::Value = serde_json::from_str(&languages)
        .with_context(|| format!("failed to parse {}", config.template.languages.display()))?;

    let ctx = RequestContext {
        hostname: hostname.to_string(),
        port: config.server.port,
        livereload_port: config.livereload.port,
        supported_languages,
        websocket_host: config.template.websocket_host.clone(),
    };
    Ok(PlaceholderTable::development(&ctx, &config.template.extra).render(&template))
}

pub async fn index(state: &DevState, headers: &HeaderMap, path: &str) -> Response {
    tracing::info!("GET {}", path);
    match render_index(&state.config, &hostname(headers)).await {
        Ok(html) => html_response(html),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to render index");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)).into_response()
        }
    }
}

fn html_response(html: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
            (header::CONTENT_LENGTH, html.len().to_string()),
        ],
        html,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn host(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_hostname_strips_port() {
        assert_eq!(hostname(&host("dev.beta.online-go.com:8080")), "dev.beta.online-go.com");
        assert_eq!(hostname(&host("example.com")), "example.com");
        assert_eq!(hostname(&host("[::1]:8080")), "[::1]");
        assert_eq!(hostname(&HeaderMap::new()), "localhost");
    }

    #[tokio::test]
    async fn test_render_index_fills_placeholders() {
        let dir = temp_dir::TempDir::new().unwrap();
        let index = dir.child("index.html");
        let languages = dir.child("languages.json");
        std::fs::write(
            &index,
            "<script src=\"{{CDN_SERVICE}}ogs.{{VERSION_DOTJS}}\"></script>{{ SUPPORTED_LANGUAGES }}{{NOPE}}",
        )
        .unwrap();
        std::fs::write(&languages, "{\"en\": \"English\"}").unwrap();

        let mut config = Config::default();
        config.template.index = index;
        config.template.languages = languages;

        let html = render_index(&config, "example.com").await.unwrap();
        assert_eq!(
            html,
            "<script src=\"//example.com:8080/ogs.js\"></script>{\"en\":\"English\"}{{NOPE}}"
        );
    }

    #[tokio::test]
    async fn test_render_index_keeps_language_order() {
        let dir = temp_dir::TempDir::new().unwrap();
        let index = dir.child("index.html");
        let languages = dir.child("languages.json");
        std::fs::write(&index, "{{SUPPORTED_LANGUAGES}}").unwrap();
        std::fs::write(
            &languages,
            "{\n  \"en\": \"English\",\n  \"de\": \"Deutsch\",\n  \"zh-cn\": \"中文\"\n}\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.template.index = index;
        config.template.languages = languages;

        let html = render_index(&config, "localhost").await.unwrap();
        assert_eq!(html, r#"{"en":"English","de":"Deutsch","zh-cn":"中文"}"#);
    }

    #[tokio::test]
    async fn test_render_index_bad_languages_is_error() {
        let dir = temp_dir::TempDir::new().unwrap();
        let index = dir.child("index.html");
        let languages = dir.child("languages.json");
        std::fs::write(&index, "x").unwrap();
        std::fs::write(&languages, "{not json").unwrap();

        let mut config = Config::default();
        config.template.index = index;
        config.template.languages = languages;
        assert!(render_index(&config, "localhost").await.is_err());
    }
}
