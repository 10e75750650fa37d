use axum::{
    Router,
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::{
    create_tx, csrf_protected,
    database::{comments::get_comment, conn::LazyConn, posts::get_post},
    entities::comment::Comment,
    extractors::{auth::AuthSession, page::PageContext},
    get_conn,
    utils::{
        response::{AppError, parse_id, redirect},
        state::ArcAppState,
        validate::{FormErrors, ValidForm, not_blank},
    },
    views,
};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CommentForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(
        custom(function = "not_blank"),
        length(max = 256, message = "Comment must be at most 256 characters long.")
    )]
    pub text: String,
}

csrf_protected!(CommentForm);

fn post_path(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

/// Comment `comment_id` of post `post_id` written by `session`.
///
/// A comment of another post is missing; someone else's comment sends the
/// visitor back to the post.
async fn own_comment(
    post_id: &str,
    comment_id: &str,
    session: &AuthSession,
    conn: &mut LazyConn,
) -> Result<Result<Comment, Response>, AppError> {
    let post_id = parse_id(post_id)?;
    let comment_id = parse_id(comment_id)?;
    let comment = get_comment(post_id, comment_id, conn)
        .await?
        .ok_or(AppError::NotFound)?;
    if comment.author_id != session.user_id {
        return Ok(Err(redirect(&post_path(post_id))));
    }
    Ok(Ok(comment))
}

mod add_comment {
    use super::*;
    use crate::database::comments::create_comment;

    pub async fn handler(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
        ValidForm { data, errors }: ValidForm<CommentForm>,
    ) -> Result<Response, AppError> {
        let post_id = parse_id(&post_id)?;
        let mut conn = get_conn!(state);
        get_post(post_id, Some(session.user_id), &mut conn)
            .await?
            .filter(|p| p.visible_to(Some(session.user_id), Utc::now()))
            .ok_or(AppError::NotFound)?;

        if !errors.is_empty() {
            let action = format!("/posts/{}/comment/", post_id);
            return Ok(Html(views::forms::comment_page(
                &ctx,
                "Add comment",
                &action,
                &data,
                &errors,
            ))
            .into_response());
        }

        let mut tx = create_tx!(conn);
        let comment_id = create_comment(post_id, session.user_id, data.text.trim(), &mut tx).await?;
        tx.commit().await?;
        info!("User {} commented {} on post {}", session.user_id, comment_id, post_id);

        Ok(redirect(&post_path(post_id)))
    }
}

mod edit_comment {
    use super::*;
    use crate::database::comments::update_comment;

    fn action(comment: &Comment) -> String {
        format!(
            "/posts/{}/comment/{}/edit_comment/",
            comment.post_id, comment.comment_id
        )
    }

    pub async fn form(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path((post_id, comment_id)): Path<(String, String)>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let comment = match own_comment(&post_id, &comment_id, &session, &mut conn).await? {
            Ok(comment) => comment,
            Err(elsewhere) => return Ok(elsewhere),
        };
        let data = CommentForm {
            text: comment.text.clone(),
            ..CommentForm::default()
        };
        Ok(Html(views::forms::comment_page(
            &ctx,
            "Edit comment",
            &action(&comment),
            &data,
            &FormErrors::default(),
        ))
        .into_response())
    }

    pub async fn handler(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path((post_id, comment_id)): Path<(String, String)>,
        ValidForm { data, errors }: ValidForm<CommentForm>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let comment = match own_comment(&post_id, &comment_id, &session, &mut conn).await? {
            Ok(comment) => comment,
            Err(elsewhere) => return Ok(elsewhere),
        };
        if !errors.is_empty() {
            return Ok(Html(views::forms::comment_page(
                &ctx,
                "Edit comment",
                &action(&comment),
                &data,
                &errors,
            ))
            .into_response());
        }

        let mut tx = create_tx!(conn);
        update_comment(comment.comment_id, data.text.trim(), &mut tx).await?;
        tx.commit().await?;

        Ok(redirect(&post_path(comment.post_id)))
    }
}

mod delete_comment {
    use super::*;
    use crate::{database::comments::delete_comment, endpoints::ConfirmForm};

    pub async fn form(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path((post_id, comment_id)): Path<(String, String)>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        match own_comment(&post_id, &comment_id, &session, &mut conn).await? {
            Ok(comment) => Ok(Html(views::forms::delete_comment(&ctx, &comment)).into_response()),
            Err(elsewhere) => Ok(elsewhere),
        }
    }

    pub async fn handler(
        session: AuthSession,
        State(state): State<ArcAppState>,
        Path((post_id, comment_id)): Path<(String, String)>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let comment = match own_comment(&post_id, &comment_id, &session, &mut conn).await? {
            Ok(comment) => comment,
            Err(elsewhere) => return Ok(elsewhere),
        };

        let mut tx = create_tx!(conn);
        delete_comment(comment.comment_id, &mut tx).await?;
        tx.commit().await?;

        Ok(redirect(&post_path(comment.post_id)))
    }
}

pub fn router() -> Router<ArcAppState> {
    Router::new()
        .route("/posts/{post_id}/comment/", post(add_comment::handler))
        .route(
            "/posts/{post_id}/comment/{comment_id}/edit_comment/",
            get(edit_comment::form).post(edit_comment::handler),
        )
        .route(
            "/posts/{post_id}/comment/{comment_id}/delete_comment/",
            get(delete_comment::form).post(delete_comment::handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_length_is_bounded() {
        let mut form = CommentForm {
            text: String::new(),
            ..CommentForm::default()
        };
        assert!(form.validate().is_err());
        form.text = "x".repeat(256);
        assert!(form.validate().is_ok());
        form.text.push('x');
        assert!(form.validate().is_err());
    }

    #[test]
    fn whitespace_comment_is_rejected() {
        let form = CommentForm {
            text: "   \n".to_string(),
            ..CommentForm::default()
        };
        let errors: FormErrors = form.validate().unwrap_err().into();
        assert_eq!(errors.field("text"), ["This field is required.".to_string()]);
    }
}
