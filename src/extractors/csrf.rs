use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::utils::{
    cookies::{CSRF_COOKIE, CookieOptions, request_cookie, set_cookie},
    response::{ApiError, AppError},
    security::generate_key,
    state::ArcAppState,
    validate::check_csrf,
};

pub const CSRF_HEADER: &str = "x-csrftoken";
const CSRF_COOKIE_MAX_AGE: u64 = 365 * 24 * 3600;

/// Token of the current request, as found in or issued for the cookie.
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

fn well_formed(token: &str) -> bool {
    (16..=128).contains(&token.len())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Makes sure every visitor holds a `csrftoken` cookie.
///
/// The cookie stays readable from scripts: the like widget copies it into the
/// `X-CSRFToken` header.
pub async fn csrf_cookie(
    State(state): State<ArcAppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = request_cookie(req.headers(), CSRF_COOKIE).filter(|t| well_formed(t));
    let fresh = existing.is_none();
    let token = existing.unwrap_or_else(|| generate_key(24));

    req.extensions_mut().insert(CsrfToken(token.clone()));
    let mut response = next.run(req).await;

    if fresh {
        debug!("Issuing new CSRF cookie");
        let header = set_cookie(
            CSRF_COOKIE,
            &token,
            CookieOptions {
                http_only: false,
                secure: state.config.secure_cookies,
                max_age: Some(CSRF_COOKIE_MAX_AGE),
            },
        );
        match HeaderValue::from_str(&header) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!("Unencodable CSRF cookie: {}", e),
        }
    }
    response
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or_else(|| {
                error!("CSRF middleware is not installed");
                AppError::Internal
            })
    }
}

/// `X-CSRFToken` header checked against the cookie, for script requests.
#[derive(Debug)]
pub struct CsrfHeader;

impl<S> FromRequestParts<S> for CsrfHeader
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let cookie = request_cookie(&parts.headers, CSRF_COOKIE).unwrap_or_default();
        let submitted = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        check_csrf(&cookie, submitted)
            .map(|_| CsrfHeader)
            .map_err(|_| ApiError(StatusCode::FORBIDDEN, "CSRF verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(cookie: Option<&str>, header: Option<&str>) -> Parts {
        let mut builder = HttpRequest::builder().method("POST").uri("/posts/1/like/");
        if let Some(c) = cookie {
            builder = builder.header("cookie", c);
        }
        if let Some(h) = header {
            builder = builder.header(CSRF_HEADER, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn header_matching_cookie_passes() {
        let mut p = parts(Some("csrftoken=abcdefghijklmnop"), Some("abcdefghijklmnop"));
        assert!(CsrfHeader::from_request_parts(&mut p, &()).await.is_ok());
    }

    #[tokio::test]
    async fn missing_or_wrong_header_is_forbidden() {
        let mut p = parts(Some("csrftoken=abcdefghijklmnop"), None);
        let err = CsrfHeader::from_request_parts(&mut p, &()).await.unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let mut p = parts(Some("csrftoken=abcdefghijklmnop"), Some("nope"));
        assert!(CsrfHeader::from_request_parts(&mut p, &()).await.is_err());

        let mut p = parts(None, Some(""));
        assert!(CsrfHeader::from_request_parts(&mut p, &()).await.is_err());
    }

    #[test]
    fn token_shape() {
        assert!(well_formed(&generate_key(24)));
        assert!(!well_formed("short"));
        assert!(!well_formed("has spaces in it, sadly"));
    }
}
