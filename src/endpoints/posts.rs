use axum::{
    Router,
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::{
    create_tx, csrf_protected,
    database::{
        categories::{get_category, list_categories},
        conn::LazyConn,
        locations::{get_location, list_locations},
        posts::{PostData, get_post},
    },
    entities::post::Post,
    extractors::{auth::AuthSession, page::PageContext},
    get_conn,
    utils::{
        response::{AppError, parse_id, redirect},
        state::ArcAppState,
        validate::{FormErrors, ValidForm, checkbox, not_blank, optional_id},
    },
    views,
};

const DATE_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Ok(());
    }
    let scheme_ok = url.starts_with("https://") || url.starts_with("http://") || url.starts_with('/');
    if !scheme_ok || url.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("image_url")
            .with_message("Enter a valid URL or a path starting with /.".into()));
    }
    Ok(())
}

/// Post form as submitted; select values and the date stay raw until
/// `to_data` so a bad value can be shown back to the author.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(
        custom(function = "not_blank"),
        length(max = 256, message = "Title must be at most 256 characters long.")
    )]
    pub title: String,
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub text: String,
    #[serde(default)]
    #[validate(
        length(max = 512, message = "URL is too long."),
        custom(function = "validate_image_url")
    )]
    pub image: String,
    #[serde(default)]
    pub pub_date: String,
    pub location: Option<String>,
    pub category: Option<String>,
    pub is_published: Option<String>,
}

csrf_protected!(PostForm);

pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|naive| naive.and_utc())
}

impl PostForm {
    /// Empty form for a new post: published, dated now.
    pub fn blank(now: DateTime<Utc>) -> Self {
        Self {
            pub_date: now.format(DATE_INPUT_FORMAT).to_string(),
            is_published: Some("on".to_string()),
            ..Self::default()
        }
    }

    pub fn from_post(post: &Post) -> Self {
        Self {
            csrfmiddlewaretoken: String::new(),
            title: post.title.clone(),
            text: post.text.clone(),
            image: post.image.clone().unwrap_or_default(),
            pub_date: post.pub_date.format(DATE_INPUT_FORMAT).to_string(),
            location: post.location.as_ref().map(|l| l.location_id.to_string()),
            category: post.category.as_ref().map(|c| c.category_id.to_string()),
            is_published: post.is_published.then(|| "on".to_string()),
        }
    }

    pub fn published(&self) -> bool {
        checkbox(&self.is_published)
    }

    /// Parses the raw fields, recording a message for each one that fails.
    pub fn to_data(&self, errors: &mut FormErrors) -> Option<PostData> {
        let pub_date = if self.pub_date.trim().is_empty() {
            errors.add("pub_date", "This field is required.");
            None
        } else {
            let parsed = parse_pub_date(&self.pub_date);
            if parsed.is_none() {
                errors.add("pub_date", "Enter a valid date and time.");
            }
            parsed
        };
        let location_id = optional_id(&self.location)
            .map_err(|_| errors.add("location", "Select a valid choice."))
            .ok();
        let category_id = optional_id(&self.category)
            .map_err(|_| errors.add("category", "Select a valid choice."))
            .ok();

        if !errors.is_empty() {
            return None;
        }
        let image = self.image.trim();
        Some(PostData {
            title: self.title.trim().to_string(),
            text: self.text.trim().to_string(),
            image: (!image.is_empty()).then(|| image.to_string()),
            pub_date: pub_date?,
            location_id: location_id?,
            category_id: category_id?,
            is_published: self.published(),
        })
    }
}

/// Selected category and location must still exist.
async fn check_choices(
    data: &PostData,
    errors: &mut FormErrors,
    conn: &mut LazyConn,
) -> Result<(), AppError> {
    if let Some(id) = data.category_id {
        if get_category(id, conn).await?.is_none() {
            errors.add("category", "Select a valid choice.");
        }
    }
    if let Some(id) = data.location_id {
        if get_location(id, conn).await?.is_none() {
            errors.add("location", "Select a valid choice.");
        }
    }
    Ok(())
}

async fn render_form(
    ctx: &PageContext,
    heading: &str,
    action: &str,
    data: &PostForm,
    errors: &FormErrors,
    conn: &mut LazyConn,
) -> Result<Response, AppError> {
    let categories = list_categories(None, None, conn).await?;
    let locations = list_locations(None, None, conn).await?;
    Ok(Html(views::forms::post_form(
        ctx,
        heading,
        action,
        data,
        errors,
        &categories,
        &locations,
    ))
    .into_response())
}

/// The post, if `session` wrote it; anyone else is sent to its page.
async fn own_post(
    raw_id: &str,
    session: &AuthSession,
    conn: &mut LazyConn,
) -> Result<Result<Post, Response>, AppError> {
    let post_id = parse_id(raw_id)?;
    let post = get_post(post_id, Some(session.user_id), conn)
        .await?
        .ok_or(AppError::NotFound)?;
    if post.author_id != session.user_id {
        return Ok(Err(redirect(&format!("/posts/{}/", post_id))));
    }
    Ok(Ok(post))
}

mod create_post {
    use super::*;
    use crate::database::posts::create_post;

    const HEADING: &str = "New post";
    const ACTION: &str = "/posts/create/";

    pub async fn form(
        _session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        render_form(
            &ctx,
            HEADING,
            ACTION,
            &PostForm::blank(Utc::now()),
            &FormErrors::default(),
            &mut conn,
        )
        .await
    }

    pub async fn handler(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        ValidForm { data, mut errors }: ValidForm<PostForm>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let Some(post) = data.to_data(&mut errors) else {
            return render_form(&ctx, HEADING, ACTION, &data, &errors, &mut conn).await;
        };
        check_choices(&post, &mut errors, &mut conn).await?;
        if !errors.is_empty() {
            return render_form(&ctx, HEADING, ACTION, &data, &errors, &mut conn).await;
        }

        let mut tx = create_tx!(conn);
        let post_id = create_post(session.user_id, &post, &mut tx).await?;
        tx.commit().await?;
        info!("User {} created post {}", session.user_id, post_id);

        Ok(redirect(&format!(
            "/profile/{}/",
            urlencoding::encode(&session.username)
        )))
    }
}

mod edit_post {
    use super::*;
    use crate::database::posts::update_post;

    const HEADING: &str = "Edit post";

    pub async fn form(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let post = match own_post(&post_id, &session, &mut conn).await? {
            Ok(post) => post,
            Err(elsewhere) => return Ok(elsewhere),
        };
        let action = format!("/posts/{}/edit/", post.post_id);
        render_form(
            &ctx,
            HEADING,
            &action,
            &PostForm::from_post(&post),
            &FormErrors::default(),
            &mut conn,
        )
        .await
    }

    pub async fn handler(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
        ValidForm { data, mut errors }: ValidForm<PostForm>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let post = match own_post(&post_id, &session, &mut conn).await? {
            Ok(post) => post,
            Err(elsewhere) => return Ok(elsewhere),
        };
        let action = format!("/posts/{}/edit/", post.post_id);

        let Some(update) = data.to_data(&mut errors) else {
            return render_form(&ctx, HEADING, &action, &data, &errors, &mut conn).await;
        };
        check_choices(&update, &mut errors, &mut conn).await?;
        if !errors.is_empty() {
            return render_form(&ctx, HEADING, &action, &data, &errors, &mut conn).await;
        }

        let mut tx = create_tx!(conn);
        update_post(post.post_id, &update, &mut tx).await?;
        tx.commit().await?;

        Ok(redirect(&format!("/posts/{}/", post.post_id)))
    }
}

mod delete_post {
    use super::*;
    use crate::{database::posts::delete_post, endpoints::ConfirmForm};

    pub async fn form(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        match own_post(&post_id, &session, &mut conn).await? {
            Ok(post) => Ok(Html(views::forms::delete_post(&ctx, &post)).into_response()),
            Err(elsewhere) => Ok(elsewhere),
        }
    }

    pub async fn handler(
        session: AuthSession,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        let mut conn = get_conn!(state);
        let post = match own_post(&post_id, &session, &mut conn).await? {
            Ok(post) => post,
            Err(elsewhere) => return Ok(elsewhere),
        };

        let mut tx = create_tx!(conn);
        delete_post(post.post_id, &mut tx).await?;
        tx.commit().await?;
        info!("User {} deleted post {}", session.user_id, post.post_id);

        Ok(redirect("/"))
    }
}

pub fn router() -> Router<ArcAppState> {
    Router::new()
        .route(
            "/posts/create/",
            get(create_post::form).post(create_post::handler),
        )
        .route(
            "/posts/{post_id}/edit/",
            get(edit_post::form).post(edit_post::handler),
        )
        .route(
            "/posts/{post_id}/delete/",
            get(delete_post::form).post(delete_post::handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::post::tests::post;
    use chrono::TimeZone;

    fn form() -> PostForm {
        PostForm {
            title: "Trip".to_string(),
            text: "Went north.".to_string(),
            pub_date: "2024-05-01T10:30".to_string(),
            category: Some("7".to_string()),
            location: Some(String::new()),
            is_published: Some("on".to_string()),
            ..PostForm::default()
        }
    }

    #[test]
    fn parses_browser_dates() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        assert_eq!(parse_pub_date("2024-05-01T10:30"), Some(expected));
        assert_eq!(parse_pub_date("2024-05-01 10:30"), Some(expected));
        assert_eq!(parse_pub_date("yesterday"), None);
    }

    #[test]
    fn valid_form_becomes_post_data() {
        let mut errors = FormErrors::default();
        let data = form().to_data(&mut errors).unwrap();
        assert!(errors.is_empty());
        assert_eq!(data.category_id, Some(7));
        assert_eq!(data.location_id, None);
        assert_eq!(data.image, None);
        assert!(data.is_published);
    }

    #[test]
    fn bad_date_and_choice_are_reported() {
        let mut f = form();
        f.pub_date = "soon".to_string();
        f.category = Some("abc".to_string());
        let mut errors = FormErrors::default();
        assert!(f.to_data(&mut errors).is_none());
        assert_eq!(errors.field("pub_date"), ["Enter a valid date and time.".to_string()]);
        assert_eq!(errors.field("category"), ["Select a valid choice.".to_string()]);
    }

    #[test]
    fn whitespace_title_and_text_are_rejected() {
        let mut f = form();
        f.title = "   ".to_string();
        f.text = "\n\t".to_string();
        let mut errors: FormErrors = f.validate().unwrap_err().into();
        assert_eq!(errors.field("title"), ["This field is required.".to_string()]);
        assert_eq!(errors.field("text"), ["This field is required.".to_string()]);
        assert!(f.to_data(&mut errors).is_none());
    }

    #[test]
    fn stored_text_is_trimmed() {
        let mut f = form();
        f.title = "  Trip ".to_string();
        f.text = " Went north.\n".to_string();
        assert!(f.validate().is_ok());
        let data = f.to_data(&mut FormErrors::default()).unwrap();
        assert_eq!((data.title.as_str(), data.text.as_str()), ("Trip", "Went north."));
    }

    #[test]
    fn unchecked_box_unpublishes() {
        let mut f = form();
        f.is_published = None;
        let data = f.to_data(&mut FormErrors::default()).unwrap();
        assert!(!data.is_published);
    }

    #[test]
    fn image_must_look_like_a_url() {
        let mut f = form();
        f.image = "javascript:alert(1)".to_string();
        assert!(f.validate().is_err());
        f.image = "https://example.com/a.png".to_string();
        assert!(f.validate().is_ok());
    }

    #[test]
    fn edit_form_starts_from_the_post() {
        let p = post(3);
        let f = PostForm::from_post(&p);
        assert_eq!(f.title, p.title);
        assert_eq!(f.category.as_deref(), Some("1"));
        assert!(f.published());
    }
}
