use std::sync::LazyLock;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderValue, header::SET_COOKIE},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use regex::Regex;
use serde::Deserialize;
use tracing::{error, info, warn};
use validator::{Validate, ValidateEmail, ValidationError};

use crate::{
    create_tx, csrf_protected,
    database::conn::DbError,
    extractors::{auth::AuthSession, page::PageContext},
    get_conn,
    utils::{
        cookies::{CookieOptions, SESSION_COOKIE, expire_cookie, set_cookie},
        response::{AppError, redirect},
        security::{authenticate_async, check_password_async, store_password_async},
        state::ArcAppState,
        validate::{FormErrors, NON_FIELD, ValidForm},
    },
    views,
};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("static regex"));

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::new("username").with_message(
            "Enter a valid username. Letters, digits and @/./+/-/_ only.".into(),
        ));
    }
    Ok(())
}

fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("password_numeric")
            .with_message("This password is entirely numeric.".into()));
    }
    Ok(())
}

/// Email is optional on the profile, but must be valid when given.
fn validate_optional_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || email.validate_email() {
        return Ok(());
    }
    Err(ValidationError::new("email").with_message("Enter a valid email address.".into()))
}

/// Where to go after signing in: only local paths are honoured.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(cookie).map_err(|e| {
        error!("Unencodable cookie: {}", e);
        AppError::Internal
    })?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

fn unique_violation(err: &DbError) -> bool {
    err.violated_constraint() == Some("users_username_key")
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SignupForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters long."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[serde(default)]
    #[validate(
        length(min = 8, message = "This password is too short. It must contain at least 8 characters."),
        custom(function = "validate_new_password")
    )]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProfileForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters long."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "At most 150 characters."))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "At most 150 characters."))]
    pub last_name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_optional_email"))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PasswordForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub old_password: String,
    #[serde(default)]
    #[validate(
        length(min = 8, message = "This password is too short. It must contain at least 8 characters."),
        custom(function = "validate_new_password")
    )]
    pub new_password1: String,
    #[serde(default)]
    pub new_password2: String,
}

csrf_protected!(LoginForm, SignupForm, ProfileForm, PasswordForm);

mod login {
    use super::*;
    use crate::database::{sessions::create_session, users::get_auth_user};

    #[derive(Debug, Deserialize)]
    pub struct Params {
        pub next: Option<String>,
    }

    pub async fn form(ctx: PageContext, Query(params): Query<Params>) -> Html<String> {
        let data = LoginForm {
            next: params.next,
            ..LoginForm::default()
        };
        Html(views::forms::login(&ctx, &data, &FormErrors::default()))
    }

    pub async fn handler(
        ctx: PageContext,
        State(state): State<ArcAppState>,
        ValidForm { data, mut errors }: ValidForm<LoginForm>,
    ) -> Result<Response, AppError> {
        if !errors.is_empty() {
            return Ok(Html(views::forms::login(&ctx, &data, &errors)).into_response());
        }

        let mut conn = get_conn!(state);
        let user = get_auth_user(data.username.trim(), &mut conn).await?;
        let stored = user.as_ref().map(|u| u.password_hash.clone());
        let authenticated = authenticate_async(stored, data.password.clone())
            .await
            .then_some(user)
            .flatten();
        let Some(user) = authenticated else {
            warn!("Failed sign in for {:?}", data.username);
            errors.add(
                NON_FIELD,
                "Please enter a correct username and password. Note that both fields may be case-sensitive.",
            );
            return Ok(Html(views::forms::login(&ctx, &data, &errors)).into_response());
        };

        let token = create_session(user.user_id, &state).await.map_err(|e| {
            error!("Failed to store session: {:?}", e);
            AppError::Internal
        })?;
        info!("User {} signed in", user.user_id);

        let cookie = set_cookie(
            SESSION_COOKIE,
            &token,
            CookieOptions {
                http_only: true,
                secure: state.config.secure_cookies,
                max_age: Some(state.config.session_ttl_secs),
            },
        );
        with_cookie(redirect(safe_next(data.next.as_deref())), &cookie)
    }
}

mod logout {
    use super::*;
    use crate::{
        database::sessions::destroy_session, endpoints::ConfirmForm,
        extractors::auth::MaybeSession,
    };

    pub async fn handler(
        MaybeSession(session): MaybeSession,
        State(state): State<ArcAppState>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        if let Some(session) = session {
            destroy_session(&session.session_id, &state)
                .await
                .map_err(|e| {
                    error!("Failed to drop session: {:?}", e);
                    AppError::Internal
                })?;
            info!("User {} signed out", session.user_id);
        }
        with_cookie(redirect("/"), &expire_cookie(SESSION_COOKIE))
    }
}

mod registration {
    use super::*;
    use crate::database::users::{NewUser, create_user};

    pub async fn form(ctx: PageContext) -> Html<String> {
        Html(views::forms::signup(
            &ctx,
            &SignupForm::default(),
            &FormErrors::default(),
        ))
    }

    pub async fn handler(
        ctx: PageContext,
        State(state): State<ArcAppState>,
        ValidForm { data, mut errors }: ValidForm<SignupForm>,
    ) -> Result<Response, AppError> {
        if data.password1 != data.password2 {
            errors.add("password2", PASSWORD_MISMATCH);
        }
        if !errors.is_empty() {
            return Ok(Html(views::forms::signup(&ctx, &data, &errors)).into_response());
        }

        let password_hash = store_password_async(data.password1.clone()).await;
        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        let created = create_user(
            NewUser {
                username: data.username.trim(),
                email: data.email.trim(),
                password_hash: &password_hash,
            },
            &mut tx,
        )
        .await;

        match created {
            Ok(user_id) => {
                tx.commit().await?;
                info!("Registered user {} ({})", user_id, data.username);
                Ok(redirect("/"))
            }
            Err(err) if unique_violation(&err) => {
                errors.add("username", USERNAME_TAKEN);
                Ok(Html(views::forms::signup(&ctx, &data, &errors)).into_response())
            }
            Err(err) => Err(err.into()),
        }
    }
}

mod edit_profile {
    use super::*;
    use crate::database::users::{UserProfileUpdate, get_user, update_user_profile};

    pub async fn form(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
    ) -> Result<Html<String>, AppError> {
        let mut conn = get_conn!(state);
        let user = get_user(session.user_id, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;
        let data = ProfileForm {
            csrfmiddlewaretoken: String::new(),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
        };
        Ok(Html(views::forms::edit_profile(
            &ctx,
            &data,
            &FormErrors::default(),
        )))
    }

    pub async fn handler(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        ValidForm { data, mut errors }: ValidForm<ProfileForm>,
    ) -> Result<Response, AppError> {
        if !errors.is_empty() {
            return Ok(Html(views::forms::edit_profile(&ctx, &data, &errors)).into_response());
        }

        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        let username = data.username.trim().to_string();
        let updated = update_user_profile(
            session.user_id,
            UserProfileUpdate {
                username: Some(username.clone()),
                first_name: Some(data.first_name.trim().to_string()),
                last_name: Some(data.last_name.trim().to_string()),
                email: Some(data.email.trim().to_string()),
            },
            &mut tx,
        )
        .await;

        match updated {
            Ok(_) => {
                tx.commit().await?;
                Ok(redirect(&format!(
                    "/profile/{}/",
                    urlencoding::encode(&username)
                )))
            }
            Err(err) if unique_violation(&err) => {
                errors.add("username", USERNAME_TAKEN);
                Ok(Html(views::forms::edit_profile(&ctx, &data, &errors)).into_response())
            }
            Err(err) => Err(err.into()),
        }
    }
}

mod change_password {
    use super::*;
    use crate::database::users::{get_password_hash, get_user_by_username, set_password_hash};

    /// `None` when `username` is somebody else: they are sent to that profile.
    async fn own_account(
        username: &str,
        session: &AuthSession,
        state: &ArcAppState,
    ) -> Result<Option<Response>, AppError> {
        let mut conn = get_conn!(state);
        let user = get_user_by_username(username, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;
        if user.user_id != session.user_id {
            return Ok(Some(redirect(&format!(
                "/profile/{}/",
                urlencoding::encode(&user.username)
            ))));
        }
        Ok(None)
    }

    pub async fn form(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(username): Path<String>,
    ) -> Result<Response, AppError> {
        if let Some(elsewhere) = own_account(&username, &session, &state).await? {
            return Ok(elsewhere);
        }
        Ok(Html(views::forms::change_password(
            &ctx,
            &username,
            &FormErrors::default(),
        ))
        .into_response())
    }

    pub async fn handler(
        session: AuthSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(username): Path<String>,
        ValidForm { data, mut errors }: ValidForm<PasswordForm>,
    ) -> Result<Response, AppError> {
        if let Some(elsewhere) = own_account(&username, &session, &state).await? {
            return Ok(elsewhere);
        }

        let mut conn = get_conn!(state);
        let stored = get_password_hash(session.user_id, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;
        if !check_password_async(stored, data.old_password.clone()).await {
            errors.add(
                "old_password",
                "Your old password was entered incorrectly. Please enter it again.",
            );
        }
        if data.new_password1 != data.new_password2 {
            errors.add("new_password2", PASSWORD_MISMATCH);
        }
        if !errors.is_empty() {
            return Ok(
                Html(views::forms::change_password(&ctx, &username, &errors)).into_response(),
            );
        }

        let password_hash = store_password_async(data.new_password1.clone()).await;
        let mut tx = create_tx!(conn);
        set_password_hash(session.user_id, &password_hash, &mut tx).await?;
        tx.commit().await?;
        info!("User {} changed password", session.user_id);

        Ok(Html(views::forms::password_changed(&ctx, &username)).into_response())
    }
}

pub fn router() -> Router<ArcAppState> {
    Router::new()
        .route(
            "/auth/registration/",
            get(registration::form).post(registration::handler),
        )
        .route("/auth/login/", get(login::form).post(login::handler))
        .route("/auth/logout/", post(logout::handler))
        .route(
            "/profile/edit_profile/",
            get(edit_profile::form).post(edit_profile::handler),
        )
        .route(
            "/profile/{username}/password/",
            get(change_password::form).post(change_password::handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_must_stay_on_site() {
        assert_eq!(safe_next(Some("/posts/1/")), "/posts/1/");
        assert_eq!(safe_next(Some("//evil.example/")), "/");
        assert_eq!(safe_next(Some("https://evil.example/")), "/");
        assert_eq!(safe_next(Some("/\\evil")), "/");
        assert_eq!(safe_next(None), "/");
    }

    fn signup() -> SignupForm {
        SignupForm {
            username: "alice.b".to_string(),
            email: "alice@example.com".to_string(),
            password1: "correct horse".to_string(),
            password2: "correct horse".to_string(),
            ..SignupForm::default()
        }
    }

    #[test]
    fn signup_rules() {
        assert!(signup().validate().is_ok());

        let mut form = signup();
        form.username = "alice smith".to_string();
        let errors: FormErrors = form.validate().unwrap_err().into();
        assert_eq!(errors.field("username").len(), 1);

        let mut form = signup();
        form.password1 = "12345678".to_string();
        let errors: FormErrors = form.validate().unwrap_err().into();
        assert_eq!(
            errors.field("password1"),
            ["This password is entirely numeric.".to_string()]
        );

        let mut form = signup();
        form.email = "nope".to_string();
        assert!(form.validate().is_err());
    }

    #[test]
    fn profile_email_may_be_blank() {
        let mut form = ProfileForm {
            username: "alice".to_string(),
            ..ProfileForm::default()
        };
        assert!(form.validate().is_ok());
        form.email = "not an email".to_string();
        assert!(form.validate().is_err());
    }

    #[test]
    fn session_cookie_is_attached() {
        let response = with_cookie(redirect("/"), "sessionid=x; Path=/").unwrap();
        assert_eq!(response.headers().get(SET_COOKIE).unwrap(), "sessionid=x; Path=/");
    }
}
