use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    extractors::{
        auth::{AuthSession, MaybeSession},
        csrf::CsrfToken,
    },
    utils::{perms::Permission, response::AppError, state::ArcAppState},
};

/// Everything the layout needs: who is looking and the token for forms.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub viewer: Option<AuthSession>,
    pub csrf_token: String,
}

impl PageContext {
    pub fn anonymous(csrf_token: &str) -> Self {
        Self {
            viewer: None,
            csrf_token: csrf_token.to_string(),
        }
    }

    pub fn viewer_id(&self) -> Option<i64> {
        self.viewer.as_ref().map(|v| v.user_id)
    }

    pub fn is_admin(&self) -> bool {
        self.viewer
            .as_ref()
            .is_some_and(|v| v.can(Permission::ADMIN_PANEL))
    }
}

impl FromRequestParts<ArcAppState> for PageContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ArcAppState,
    ) -> Result<Self, Self::Rejection> {
        let CsrfToken(csrf_token) = CsrfToken::from_request_parts(parts, state).await?;
        let MaybeSession(viewer) = MaybeSession::from_request_parts(parts, state).await?;
        Ok(PageContext { viewer, csrf_token })
    }
}
