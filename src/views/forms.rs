//! Form markup. Inputs echo submitted values back, except passwords.

use crate::{
    endpoints::{
        accounts::{LoginForm, PasswordForm, ProfileForm, SignupForm},
        comments::CommentForm,
        posts::PostForm,
    },
    entities::{category::Category, comment::Comment, location::Location, post::Post},
    extractors::page::PageContext,
    utils::validate::{FormErrors, NON_FIELD},
    views::{csrf_input, escape, format_date, layout},
};

fn error_list(errors: &FormErrors, name: &str) -> String {
    let messages = errors.field(name);
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", escape(m)))
        .collect();
    format!(r#"<ul class="errorlist">{}</ul>"#, items)
}

pub fn input(label: &str, name: &str, kind: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"<p><label for="id_{name}">{label}</label>{errors}<input type="{kind}" name="{name}" id="id_{name}" value="{value}"></p>"#,
        name = name,
        label = escape(label),
        errors = error_list(errors, name),
        kind = kind,
        value = escape(value),
    )
}

fn password(label: &str, name: &str, errors: &FormErrors) -> String {
    input(label, name, "password", "", errors)
}

fn textarea(label: &str, name: &str, value: &str, errors: &FormErrors) -> String {
    format!(
        r#"<p><label for="id_{name}">{label}</label>{errors}<textarea name="{name}" id="id_{name}" rows="8">{value}</textarea></p>"#,
        name = name,
        label = escape(label),
        errors = error_list(errors, name),
        value = escape(value),
    )
}

pub fn checkbox_input(label: &str, name: &str, checked: bool) -> String {
    format!(
        r#"<p><label><input type="checkbox" name="{}"{}> {}</label></p>"#,
        name,
        if checked { " checked" } else { "" },
        escape(label)
    )
}

/// `<select>` with an empty first option standing for "none".
pub fn select(
    label: &str,
    name: &str,
    options: &[(i64, String)],
    selected: Option<&str>,
    errors: &FormErrors,
) -> String {
    let selected = selected.map(str::trim).unwrap_or_default();
    let mut opts = String::from(r#"<option value="">---------</option>"#);
    for (id, text) in options {
        let id = id.to_string();
        opts.push_str(&format!(
            r#"<option value="{}"{}>{}</option>"#,
            id,
            if id == selected { " selected" } else { "" },
            escape(text)
        ));
    }
    format!(
        r#"<p><label for="id_{name}">{label}</label>{errors}<select name="{name}" id="id_{name}">{opts}</select></p>"#,
        name = name,
        label = escape(label),
        errors = error_list(errors, name),
        opts = opts,
    )
}

/// POST form with the anti-forgery token and the errors not tied to a field.
pub fn form(ctx: &PageContext, action: &str, fields: &str, errors: &FormErrors, submit: &str) -> String {
    format!(
        r#"<form method="post" action="{action}">{csrf}{general}{fields}<button type="submit">{submit}</button></form>"#,
        action = escape(action),
        csrf = csrf_input(&ctx.csrf_token),
        general = error_list(errors, NON_FIELD),
        fields = fields,
        submit = escape(submit),
    )
}

fn category_choices(categories: &[Category]) -> Vec<(i64, String)> {
    categories
        .iter()
        .map(|c| {
            let label = if c.is_published {
                c.title.clone()
            } else {
                format!("{} (hidden)", c.title)
            };
            (c.category_id, label)
        })
        .collect()
}

fn location_choices(locations: &[Location]) -> Vec<(i64, String)> {
    locations
        .iter()
        .map(|l| (l.location_id, l.name.clone()))
        .collect()
}

pub fn post_form(
    ctx: &PageContext,
    heading: &str,
    action: &str,
    data: &PostForm,
    errors: &FormErrors,
    categories: &[Category],
    locations: &[Location],
) -> String {
    let fields = [
        input("Title", "title", "text", &data.title, errors),
        textarea("Text", "text", &data.text, errors),
        input("Image URL", "image", "text", &data.image, errors),
        input(
            "Publication date",
            "pub_date",
            "datetime-local",
            &data.pub_date,
            errors,
        ),
        select(
            "Location",
            "location",
            &location_choices(locations),
            data.location.as_deref(),
            errors,
        ),
        select(
            "Category",
            "category",
            &category_choices(categories),
            data.category.as_deref(),
            errors,
        ),
        checkbox_input("Published", "is_published", data.published()),
    ]
    .concat();

    let content = format!(
        r#"<h1>{}</h1><p class="post-meta">A date in the future schedules the post.</p>{}"#,
        escape(heading),
        form(ctx, action, &fields, errors, "Save")
    );
    layout(ctx, heading, &content)
}

pub fn delete_post(ctx: &PageContext, post: &Post) -> String {
    let content = format!(
        concat!(
            "<h1>Delete post</h1>",
            r#"<article class="post-card"><h2>{title}</h2><p class="post-meta">{date}</p><p>{text}</p></article>"#,
            "{form}"
        ),
        title = escape(&post.title),
        date = format_date(&post.pub_date),
        text = escape(&post.text),
        form = form(
            ctx,
            &format!("/posts/{}/delete/", post.post_id),
            "",
            &FormErrors::default(),
            "Delete"
        ),
    );
    layout(ctx, "Delete post", &content)
}

/// Comment box; rendered under a post and on its own page.
pub fn comment_form(ctx: &PageContext, action: &str, data: &CommentForm, errors: &FormErrors) -> String {
    form(
        ctx,
        action,
        &textarea("Comment", "text", &data.text, errors),
        errors,
        "Send",
    )
}

pub fn comment_page(
    ctx: &PageContext,
    heading: &str,
    action: &str,
    data: &CommentForm,
    errors: &FormErrors,
) -> String {
    let content = format!(
        "<h1>{}</h1>{}",
        escape(heading),
        comment_form(ctx, action, data, errors)
    );
    layout(ctx, heading, &content)
}

pub fn delete_comment(ctx: &PageContext, comment: &Comment) -> String {
    let content = format!(
        r#"<h1>Delete comment</h1><p class="post-meta">{at}</p><p>{text}</p>{form}"#,
        at = format_date(&comment.created_at),
        text = escape(&comment.text),
        form = form(
            ctx,
            &format!(
                "/posts/{}/comment/{}/delete_comment/",
                comment.post_id, comment.comment_id
            ),
            "",
            &FormErrors::default(),
            "Delete"
        ),
    );
    layout(ctx, "Delete comment", &content)
}

pub fn login(ctx: &PageContext, data: &LoginForm, errors: &FormErrors) -> String {
    let mut fields = input("Username", "username", "text", &data.username, errors);
    fields.push_str(&password("Password", "password", errors));
    if let Some(next) = data.next.as_deref().filter(|n| !n.is_empty()) {
        fields.push_str(&format!(
            r#"<input type="hidden" name="next" value="{}">"#,
            escape(next)
        ));
    }
    let content = format!(
        r#"<h1>Log in</h1>{}<p>No account yet? <a href="/auth/registration/">Sign up</a></p>"#,
        form(ctx, "/auth/login/", &fields, errors, "Log in")
    );
    layout(ctx, "Log in", &content)
}

pub fn signup(ctx: &PageContext, data: &SignupForm, errors: &FormErrors) -> String {
    let fields = [
        input("Username", "username", "text", &data.username, errors),
        input("Email", "email", "email", &data.email, errors),
        password("Password", "password1", errors),
        password("Password confirmation", "password2", errors),
    ]
    .concat();
    let content = format!(
        "<h1>Sign up</h1>{}",
        form(ctx, "/auth/registration/", &fields, errors, "Sign up")
    );
    layout(ctx, "Sign up", &content)
}

pub fn edit_profile(ctx: &PageContext, data: &ProfileForm, errors: &FormErrors) -> String {
    let fields = [
        input("Username", "username", "text", &data.username, errors),
        input("First name", "first_name", "text", &data.first_name, errors),
        input("Last name", "last_name", "text", &data.last_name, errors),
        input("Email", "email", "email", &data.email, errors),
    ]
    .concat();
    let content = format!(
        "<h1>Edit profile</h1>{}",
        form(ctx, "/profile/edit_profile/", &fields, errors, "Save")
    );
    layout(ctx, "Edit profile", &content)
}

pub fn change_password(ctx: &PageContext, username: &str, errors: &FormErrors) -> String {
    let fields = [
        password("Old password", "old_password", errors),
        password("New password", "new_password1", errors),
        password("New password confirmation", "new_password2", errors),
    ]
    .concat();
    let action = format!("/profile/{}/password/", urlencoding::encode(username));
    let content = format!(
        "<h1>Change password</h1>{}",
        form(ctx, &action, &fields, errors, "Change password")
    );
    layout(ctx, "Change password", &content)
}

pub fn password_changed(ctx: &PageContext, username: &str) -> String {
    let content = format!(
        r#"<h1>Password changed</h1><p>Your password was changed.</p><p><a href="/profile/{}/">Back to the profile</a></p>"#,
        urlencoding::encode(username)
    );
    layout(ctx, "Password changed", &content)
}
