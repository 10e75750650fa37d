use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use crate::{
    database::{conn::LazyConn, sessions::load_session, users::get_user},
    utils::{
        cookies::{SESSION_COOKIE, request_cookie},
        perms::{Permission, role_permissions},
        response::AppError,
        state::ArcAppState,
    },
};

/// Signed in user of the current request.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: i64,
    pub session_id: String,
    pub username: String,
    pub role_id: i32,
}

impl AuthSession {
    pub fn permissions(&self) -> Permission {
        role_permissions(self.role_id)
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions().contains(permission)
    }
}

/// Cached in request extensions so several extractors share one lookup.
#[derive(Debug, Clone)]
struct ResolvedSession(Option<AuthSession>);

async fn resolve(parts: &mut Parts, state: &ArcAppState) -> Result<Option<AuthSession>, AppError> {
    if let Some(ResolvedSession(cached)) = parts.extensions.get::<ResolvedSession>() {
        return Ok(cached.clone());
    }

    let session = match request_cookie(&parts.headers, SESSION_COOKIE) {
        None => None,
        Some(cookie) => {
            let record = load_session(&cookie, state).await.map_err(|e| {
                error!("Session store error: {:?}", e);
                AppError::Internal
            })?;
            match record {
                None => None,
                Some(record) => {
                    let mut conn = LazyConn::new(state.db_pool.clone());
                    get_user(record.user_id, &mut conn)
                        .await?
                        .map(|user| AuthSession {
                            user_id: user.user_id,
                            session_id: record.session_id,
                            username: user.username,
                            role_id: user.role_id,
                        })
                }
            }
        }
    };

    parts.extensions.insert(ResolvedSession(session.clone()));
    Ok(session)
}

fn current_path(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

impl FromRequestParts<ArcAppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ArcAppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .ok_or_else(|| AppError::LoginRequired {
                next: current_path(parts),
            })
    }
}

/// Session if there is one; never rejects anonymous visitors.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<AuthSession>);

impl MaybeSession {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|s| s.user_id)
    }
}

impl FromRequestParts<ArcAppState> for MaybeSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ArcAppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(resolve(parts, state).await?))
    }
}

/// Signed in user allowed into the admin panel. Everybody else gets a 404.
#[derive(Debug, Clone)]
pub struct AdminSession(pub AuthSession);

impl FromRequestParts<ArcAppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ArcAppState,
    ) -> Result<Self, Self::Rejection> {
        let session = AuthSession::from_request_parts(parts, state).await?;
        if !session.can(Permission::ADMIN_PANEL) {
            return Err(AppError::NotFound);
        }
        Ok(AdminSession(session))
    }
}
