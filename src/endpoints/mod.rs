use axum::Router;
use serde::Deserialize;
use validator::Validate;

use crate::{csrf_protected, utils::state::ArcAppState};

pub mod accounts;
pub mod admin;
pub mod blog;
pub mod comments;
pub mod likes;
pub mod pages;
pub mod posts;

/// Body of confirmation forms (delete, log out) that only carry the token.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ConfirmForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
}

csrf_protected!(ConfirmForm);

pub fn create_router() -> Router<ArcAppState> {
    Router::new()
        .merge(blog::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(likes::router())
        .merge(accounts::router())
        .merge(admin::router())
        .fallback(pages::not_found)
}
