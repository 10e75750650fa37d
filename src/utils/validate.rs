use std::collections::BTreeMap;

use axum::{
    Form,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use tracing::warn;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::utils::{
    cookies::{CSRF_COOKIE, request_cookie},
    response::AppError,
    security::constant_time_eq,
};

/// Form bodies that carry the anti-forgery token.
pub trait CsrfProtected {
    fn csrf_token(&self) -> &str;
}

/// Field name -> messages; `__all__` holds errors not tied to one field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

pub const NON_FIELD: &str = "__all__";

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FormErrors::default();
        for (field, list) in errors.field_errors() {
            for err in list.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Enter a valid value ({}).", err.code));
                out.add(&field, message);
            }
        }
        out
    }
}

/// Urlencoded form checked against the `csrftoken` cookie and then validated.
///
/// A bad token rejects the request; validation problems are handed to the
/// handler so it can render the form again.
pub struct ValidForm<T> {
    pub data: T,
    pub errors: FormErrors,
}

impl<S, T> FromRequest<S> for ValidForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + CsrfProtected,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let cookie = request_cookie(req.headers(), CSRF_COOKIE).unwrap_or_default();

        let Form(data) = Form::<T>::from_request(req, state).await.map_err(|e| {
            warn!("Malformed form body: {}", e);
            AppError::BadRequest(e.body_text())
        })?;

        check_csrf(&cookie, data.csrf_token())?;

        let errors = match data.validate() {
            Ok(()) => FormErrors::default(),
            Err(e) => e.into(),
        };

        Ok(ValidForm { data, errors })
    }
}

/// Double submit check: the submitted token must equal the cookie.
pub fn check_csrf(cookie: &str, submitted: &str) -> Result<(), AppError> {
    if cookie.is_empty() {
        return Err(AppError::CsrfFailure("CSRF cookie not set"));
    }
    if !constant_time_eq(cookie.as_bytes(), submitted.as_bytes()) {
        return Err(AppError::CsrfFailure("CSRF token incorrect"));
    }
    Ok(())
}

/// Required text fields: whitespace alone does not count as a value.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required").with_message("This field is required.".into()));
    }
    Ok(())
}

/// Unchecked checkboxes are simply absent from the body.
pub fn checkbox(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some("on" | "true" | "1"))
}

/// `<select>` ids where an empty option means "none".
pub fn optional_id(value: &Option<String>) -> Result<Option<i64>, ()> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ()),
    }
}
