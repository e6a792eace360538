use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

/// `true` for `<prefix>/` and anything below it.
pub fn matches(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Fetch `origin + path` and hand it back as JavaScript.
pub async fn fetch(client: &reqwest::Client, origin: &str, path: &str) -> Response {
    match fetch_text(client, origin, path).await {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/javascript".to_string()),
                (header::CONTENT_LENGTH, body.len().to_string()),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(path, error = %e, "locale fetch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn fetch_text(client: &reqwest::Client, origin: &str, path: &str) -> Result<String> {
    let url = format!("{}{}", origin.trim_end_matches('/'), path);
    let resp = client.get(&url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("{} returned {}", url, status);
    }
    Ok(resp.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        assert!(matches("/locale", "/locale/en.js"));
        assert!(matches("/locale", "/locale/a/b.js"));
        assert!(!matches("/locale", "/locale"));
        assert!(matches("/locale", "/locale/"));
        assert!(!matches("/locale", "/locales/en.js"));
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_500_with_message() {
        let client = reqwest::Client::new();
        let resp = fetch(&client, "http://127.0.0.1:9", "/locale/en.js").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert!(!body.is_empty());
    }
}
