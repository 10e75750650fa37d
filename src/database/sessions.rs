use fred::prelude::*;
use fred::types::Expiration;

use crate::utils::{
    security::{generate_key, sign_session, verify_session},
    state::ArcAppState,
};

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Stores a new session for `user_id` and returns the signed cookie value.
pub async fn create_session(user_id: i64, state: &ArcAppState) -> Result<String, Error> {
    let session_id = generate_key(24);
    state
        .sessions_redis
        .set::<(), _, _>(
            session_key(&session_id),
            user_id.to_string(),
            Some(Expiration::EX(state.config.session_ttl_secs as i64)),
            None,
            false,
        )
        .await?;
    Ok(sign_session(&session_id, &state.config.secret_key))
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: i64,
}

/// Resolves a cookie value to its live session.
/// Bad signatures and unknown or expired sessions resolve to `None`.
pub async fn load_session(
    cookie: &str,
    state: &ArcAppState,
) -> Result<Option<SessionRecord>, Error> {
    let Ok(session_id) = verify_session(cookie, &state.config.secret_key) else {
        return Ok(None);
    };

    let stored: Option<String> = state.sessions_redis.get(session_key(&session_id)).await?;
    Ok(stored
        .and_then(|raw| raw.parse().ok())
        .map(|user_id| SessionRecord {
            session_id,
            user_id,
        }))
}

pub async fn destroy_session(session_id: &str, state: &ArcAppState) -> Result<(), Error> {
    state
        .sessions_redis
        .del::<i64, _>(session_key(session_id))
        .await?;
    Ok(())
}
