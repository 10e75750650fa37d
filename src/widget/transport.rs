use reqwest::header::{CONTENT_TYPE, COOKIE};
use tracing::debug;

use super::{ToggleRequest, Transport, WidgetError};
use crate::{entities::like::LikeResponse, extractors::csrf::CSRF_HEADER};

/// Talks to a running server the way the browser script does.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    cookie: String,
}

impl HttpTransport {
    /// `cookie` is sent as is, so it should hold both the session and the
    /// CSRF cookie.
    pub fn new(base_url: &str, cookie: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie: cookie.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    async fn toggle(&self, request: ToggleRequest) -> Result<LikeResponse, WidgetError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(CSRF_HEADER, request.csrf_token)
            .header(COOKIE, &self.cookie)
            .send()
            .await
            .map_err(|e| WidgetError::Transport(e.to_string()))?;

        // error statuses still carry a JSON body with `error`
        response
            .json::<LikeResponse>()
            .await
            .map_err(|e| WidgetError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::post,
    };

    async fn like(headers: HeaderMap) -> (StatusCode, Json<LikeResponse>) {
        let token = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let cookie = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if token != "tok" || !cookie.contains("sessionid=s") {
            return (StatusCode::UNAUTHORIZED, Json(LikeResponse::error("not authenticated")));
        }
        (StatusCode::OK, Json(LikeResponse::toggled(3, true)))
    }

    async fn serve() -> String {
        let app = Router::new().route("/posts/{post_id}/like/", post(like));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn request(token: &str) -> ToggleRequest {
        ToggleRequest {
            path: "/posts/9/like/".to_string(),
            csrf_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn sends_token_and_cookie() {
        let base = serve().await;
        let transport = HttpTransport::new(&base, "sessionid=s; csrftoken=tok");
        let response = transport.toggle(request("tok")).await.unwrap();
        assert_eq!(response, LikeResponse::toggled(3, true));
    }

    #[tokio::test]
    async fn error_status_still_yields_body() {
        let base = serve().await;
        let transport = HttpTransport::new(&base, "csrftoken=tok");
        let response = transport.toggle(request("tok")).await.unwrap();
        assert_eq!(response.error.as_deref(), Some("not authenticated"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let transport = HttpTransport::new(&format!("http://{}", addr), "");
        let err = transport.toggle(request("")).await.unwrap_err();
        assert!(matches!(err, WidgetError::Transport(_)));
    }
}
