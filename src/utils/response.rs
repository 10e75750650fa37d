use axum::Json;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use thiserror::Error;

use crate::{entities::like::LikeResponse, views::pages};

/// Errors of browser facing routes; each one renders a page.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("CSRF verification failed: {0}")]
    CsrfFailure(&'static str),

    #[error("login required")]
    LoginRequired { next: String },

    #[error("internal server error")]
    Internal,
}

pub fn login_url(next: &str) -> String {
    format!("/auth/login/?next={}", urlencoding::encode(next))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, Html(pages::not_found())).into_response(),
            AppError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, Html(pages::bad_request(&reason))).into_response()
            }
            AppError::CsrfFailure(reason) => {
                (StatusCode::FORBIDDEN, Html(pages::csrf_failure(reason))).into_response()
            }
            AppError::LoginRequired { next } => Redirect::to(&login_url(&next)).into_response(),
            AppError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::server_error())).into_response()
            }
        }
    }
}

/// JSON counterpart of `AppError` for script facing routes.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub &'static str);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound => ApiError(StatusCode::NOT_FOUND, "not found"),
            AppError::BadRequest(_) => ApiError(StatusCode::BAD_REQUEST, "bad request"),
            AppError::CsrfFailure(_) => ApiError(StatusCode::FORBIDDEN, "CSRF verification failed"),
            AppError::LoginRequired { .. } => ApiError(StatusCode::UNAUTHORIZED, "not authenticated"),
            AppError::Internal => {
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

impl From<crate::database::conn::DbError> for ApiError {
    fn from(err: crate::database::conn::DbError) -> Self {
        AppError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(LikeResponse::error(self.1))).into_response()
    }
}

/// 303 to `path`, what every successful form post answers with.
pub fn redirect(path: &str) -> Response {
    Redirect::to(path).into_response()
}

/// Path ids are numeric; anything else cannot name an object.
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn login_redirect_keeps_next() {
        let response = AppError::LoginRequired {
            next: "/posts/1/edit/?a=b".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/auth/login/?next=%2Fposts%2F1%2Fedit%2F%3Fa%3Db"
        );
    }

    #[test]
    fn page_errors_map_to_statuses() {
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::CsrfFailure("missing").into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn api_errors_keep_json_shape() {
        let ApiError(status, msg) = AppError::LoginRequired { next: "/".into() }.into();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "not authenticated");
    }

    #[test]
    fn non_numeric_ids_are_not_found() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound)));
    }
}
