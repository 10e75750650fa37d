use axum::{Router, routing::post};

use crate::utils::state::ArcAppState;

mod toggle {
    use axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    };
    use chrono::{DateTime, Utc};
    use tracing::debug;

    use crate::{
        database::{conn::DbError, likes::toggle_like, posts::get_post_tx},
        entities::{like::LikeResponse, post::Post},
        extractors::{auth::MaybeSession, csrf::CsrfHeader},
        get_conn,
        utils::{
            response::{ApiError, AppError},
            state::ArcAppState,
        },
    };

    const POST_NOT_FOUND: ApiError = ApiError(StatusCode::NOT_FOUND, "post not found");

    /// Only posts the viewer may open can be liked.
    pub(super) fn check_likeable(
        post: Option<&Post>,
        viewer: i64,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        match post {
            Some(post) if post.visible_to(Some(viewer), now) => Ok(()),
            _ => Err(POST_NOT_FOUND),
        }
    }

    // Toggle the viewer's like on a post
    pub async fn handler(
        _csrf: CsrfHeader,
        MaybeSession(session): MaybeSession,
        Path(post_id): Path<String>,
        State(state): State<ArcAppState>,
    ) -> Result<Json<LikeResponse>, ApiError> {
        let Some(session) = session else {
            return Err(ApiError(StatusCode::UNAUTHORIZED, "not authenticated"));
        };
        let post_id: i64 = post_id.parse().map_err(|_| POST_NOT_FOUND)?;

        let mut conn = get_conn!(state);
        let mut tx = conn.transaction().await.map_err(AppError::from)?;

        let post = get_post_tx(post_id, Some(session.user_id), &mut tx).await?;
        check_likeable(post.as_ref(), session.user_id, Utc::now())?;

        let state = toggle_like(session.user_id, post_id, &mut tx).await?;
        tx.commit().await.map_err(DbError::from)?;
        debug!(
            "User {} toggled like on post {}: liked={}",
            session.user_id, post_id, state.liked
        );

        Ok(Json(LikeResponse::toggled(state.total_likes, state.liked)))
    }
}

pub fn router() -> Router<ArcAppState> {
    Router::new().route("/posts/{post_id}/like/", post(toggle::handler))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;

    use super::toggle::check_likeable;
    use crate::entities::post::tests::post;

    #[test]
    fn visible_post_can_be_liked() {
        assert!(check_likeable(Some(&post(1)), 2, Utc::now()).is_ok());
    }

    #[test]
    fn author_can_like_own_hidden_post() {
        let mut p = post(1);
        p.is_published = false;
        assert!(check_likeable(Some(&p), 1, Utc::now()).is_ok());
    }

    #[tokio::test]
    async fn hidden_post_is_not_found() {
        let mut unpublished = post(1);
        unpublished.is_published = false;
        let mut deferred = post(1);
        deferred.pub_date = Utc::now() + Duration::days(1);
        let mut uncategorized = post(1);
        uncategorized.category = None;

        for p in [Some(&unpublished), Some(&deferred), Some(&uncategorized), None] {
            let err = check_likeable(p, 2, Utc::now()).unwrap_err();
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], br#"{"error":"post not found"}"#);
        }
    }
}
