use std::any;

use axum::{
    Router,
    http::{Response, StatusCode, header::CONTENT_TYPE},
    middleware,
};
use bytes::Bytes;
use http_body_util::Full;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::{extractors::csrf::csrf_cookie, utils::state::ArcAppState};

pub mod database;
pub mod endpoints;
pub mod entities;
pub mod extractors;
pub mod utils;
pub mod views;
pub mod widget;

const STATIC_DIR: &str = "resources/static";

fn panic_handler(err: Box<dyn any::Any + Send + 'static>) -> Response<Full<Bytes>> {
    let msg = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };
    error!("PANIC: {}", msg);

    let mut response = Response::new(Full::from(views::pages::server_error()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Whole application: pages, the like endpoint, static files and the
/// layers every request passes through.
pub fn app(state: ArcAppState) -> Router {
    endpoints::create_router()
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(middleware::from_fn_with_state(state.clone(), csrf_cookie))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_handler)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, header::{COOKIE, LOCATION, SET_COOKIE}},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::{extractors::csrf::CSRF_HEADER, utils::state::AppState};

    const TOKEN: &str = "abcdefghijklmnop";

    async fn send(req: Request<Body>) -> axum::response::Response {
        app(AppState::for_tests()).oneshot(req).await.unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn panics_render_the_error_page() {
        let response = panic_handler(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("<h1>500</h1>"));
        assert!(!html.contains("boom"));
    }

    #[tokio::test]
    async fn unknown_route_is_404_page_with_csrf_cookie() {
        let response = send(get("/no/such/page/")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("csrftoken="));
        assert!(!cookie.contains("HttpOnly"));
        assert!(body_text(response).await.contains("<h1>404</h1>"));
    }

    #[tokio::test]
    async fn login_form_embeds_cookie_token() {
        let req = Request::builder()
            .uri("/auth/login/?next=/posts/1/")
            .header(COOKIE, format!("csrftoken={}", TOKEN))
            .body(Body::empty())
            .unwrap();
        let response = send(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());
        let html = body_text(response).await;
        assert!(html.contains(&format!(r#"name="csrfmiddlewaretoken" value="{}""#, TOKEN)));
        assert!(html.contains(r#"name="next" value="/posts/1/""#));
    }

    #[tokio::test]
    async fn authoring_redirects_to_login() {
        let response = send(get("/posts/create/")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/auth/login/?next=%2Fposts%2Fcreate%2F"
        );

        let response = send(get("/admin/")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn like_without_csrf_header_is_forbidden_json() {
        let req = Request::builder()
            .method("POST")
            .uri("/posts/1/like/")
            .header(COOKIE, format!("csrftoken={}", TOKEN))
            .body(Body::empty())
            .unwrap();
        let response = send(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, r#"{"error":"CSRF verification failed"}"#);
    }

    #[tokio::test]
    async fn like_while_signed_out_is_unauthorized_json() {
        let req = Request::builder()
            .method("POST")
            .uri("/posts/1/like/")
            .header(COOKIE, format!("csrftoken={}", TOKEN))
            .header(CSRF_HEADER, TOKEN)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::empty())
            .unwrap();
        let response = send(req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, r#"{"error":"not authenticated"}"#);
    }

    #[tokio::test]
    async fn form_post_with_wrong_token_is_csrf_failure_page() {
        let req = Request::builder()
            .method("POST")
            .uri("/auth/login/")
            .header(COOKIE, format!("csrftoken={}", TOKEN))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("csrfmiddlewaretoken=wrong&username=a&password=b"))
            .unwrap();
        let response = send(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("CSRF token incorrect"));
    }

    #[tokio::test]
    async fn serves_the_like_script() {
        let response = send(get("/static/js/likes.js")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("likes-count-"));
    }
}
