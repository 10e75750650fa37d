//! Moderation panel. Only sessions with `ADMIN_PANEL` get in; for everybody
//! else the whole tree answers 404.

use std::sync::LazyLock;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::{
    create_tx, csrf_protected,
    database::conn::DbError,
    endpoints::ConfirmForm,
    extractors::{auth::AdminSession, page::PageContext},
    get_conn,
    utils::{
        perms::Permission,
        response::{AppError, parse_id, redirect},
        state::ArcAppState,
        validate::{FormErrors, ValidForm, checkbox, not_blank, optional_id},
    },
    views,
};

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("static regex"));

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if !SLUG_RE.is_match(slug) {
        return Err(ValidationError::new("slug").with_message(
            "Use latin letters, digits, hyphens and underscores only.".into(),
        ));
    }
    Ok(())
}

/// Sections of the panel need their own permission on top of `ADMIN_PANEL`.
fn require(admin: &AdminSession, permission: Permission) -> Result<(), AppError> {
    if admin.0.can(permission) {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

/// `1`/`0` from the yes/no filters; anything else means "any".
pub fn flag_filter(raw: &Option<String>) -> Option<bool> {
    match raw.as_deref() {
        Some("1") => Some(true),
        Some("0") => Some(false),
        _ => None,
    }
}

/// Query string for pagination links, without `page`.
pub fn query_string(pairs: &[(&str, &Option<String>)]) -> String {
    pairs
        .iter()
        .filter_map(|(key, value)| {
            let value = value.as_deref().filter(|v| !v.is_empty())?;
            Some(format!("{}={}", key, urlencoding::encode(value)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Default, Deserialize)]
pub struct PostsQuery {
    pub q: Option<String>,
    pub is_published: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub author: Option<String>,
    pub page: Option<String>,
}

impl PostsQuery {
    pub fn query_string(&self) -> String {
        query_string(&[
            ("q", &self.q),
            ("is_published", &self.is_published),
            ("category", &self.category),
            ("location", &self.location),
            ("author", &self.author),
        ])
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub is_published: Option<String>,
    pub page: Option<String>,
}

impl ListQuery {
    pub fn query_string(&self) -> String {
        query_string(&[("q", &self.q), ("is_published", &self.is_published)])
    }
}

/// Inline edit of one row of the posts list.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ModerateForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    pub is_published: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CategoryForm {
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
    pub description: String,
    #[serde(default)]
    #[validate(
        length(min = 1, max = 64, message = "Slug must be 1 to 64 characters long."),
        custom(function = "validate_slug")
    )]
    pub slug: String,
    pub is_published: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct LocationForm {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
    #[serde(default)]
    #[validate(
        custom(function = "not_blank"),
        length(max = 256, message = "Name must be at most 256 characters long.")
    )]
    pub name: String,
    pub is_published: Option<String>,
}

csrf_protected!(ModerateForm, CategoryForm, LocationForm);

mod dashboard {
    use super::*;
    use crate::{
        database::{
            categories::list_categories,
            comments::count_comments,
            locations::list_locations,
            posts::{PostFilter, PostScope, count_posts},
            users::count_users,
        },
        utils::perms::permissions_to_list,
        views::admin::Counts,
    };

    pub async fn handler(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
    ) -> Result<Html<String>, AppError> {
        let mut conn = get_conn!(state);
        let counts = Counts {
            posts: count_posts(PostFilter::everything(PostScope::All), &mut conn).await?,
            comments: count_comments(&mut conn).await?,
            users: count_users(&mut conn).await?,
            categories: list_categories(None, None, &mut conn).await?.len(),
            locations: list_locations(None, None, &mut conn).await?.len(),
        };
        let permissions = permissions_to_list(admin.0.permissions());
        Ok(Html(views::admin::dashboard(&ctx, &counts, &permissions)))
    }
}

mod posts {
    use super::*;
    use crate::database::{
        categories::list_categories,
        locations::list_locations,
        posts::{AdminPostQuery, delete_post, list_admin_posts, moderate_post},
        users::list_authors,
    };

    pub async fn list(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Query(query): Query<PostsQuery>,
    ) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MODERATE_POSTS)?;
        let filter = AdminPostQuery {
            search: query.q.clone(),
            is_published: flag_filter(&query.is_published),
            category_id: optional_id(&query.category).ok().flatten(),
            location_id: optional_id(&query.location).ok().flatten(),
            author_id: optional_id(&query.author).ok().flatten(),
        };

        let mut conn = get_conn!(state);
        let (posts, window) = list_admin_posts(
            &filter,
            query.page.as_deref(),
            state.config.posts_per_page,
            &mut conn,
        )
        .await?;
        let categories = list_categories(None, None, &mut conn).await?;
        let locations = list_locations(None, None, &mut conn).await?;
        let authors = list_authors(&mut conn).await?;

        Ok(Html(views::admin::posts(
            &ctx,
            &views::admin::PostsList {
                posts: &posts,
                window: &window,
                query: &query,
                categories: &categories,
                locations: &locations,
                authors: &authors,
            },
        )))
    }

    pub async fn moderate(
        admin: AdminSession,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
        ValidForm { data, .. }: ValidForm<ModerateForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MODERATE_POSTS)?;
        let post_id = parse_id(&post_id)?;
        let category_id = optional_id(&data.category)
            .map_err(|_| AppError::BadRequest("category".to_string()))?;
        let location_id = optional_id(&data.location)
            .map_err(|_| AppError::BadRequest("location".to_string()))?;

        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        let found = moderate_post(
            post_id,
            checkbox(&data.is_published),
            category_id,
            location_id,
            &mut tx,
        )
        .await;
        match found {
            Ok(true) => tx.commit().await?,
            Ok(false) => return Err(AppError::NotFound),
            // unknown category or location id
            Err(DbError::Query(e)) if e.as_db_error().is_some() => {
                return Err(AppError::BadRequest(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        info!("Admin {} moderated post {}", admin.0.user_id, post_id);

        Ok(redirect("/admin/posts/"))
    }

    pub async fn delete(
        admin: AdminSession,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MODERATE_POSTS)?;
        let post_id = parse_id(&post_id)?;
        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        if !delete_post(post_id, &mut tx).await? {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;
        info!("Admin {} deleted post {}", admin.0.user_id, post_id);

        Ok(redirect("/admin/posts/"))
    }
}

mod categories {
    use super::*;
    use crate::database::categories::{
        CategoryData, create_category, delete_category, get_category, list_categories,
        update_category,
    };

    const SLUG_TAKEN: &str = "A category with this slug already exists.";

    impl CategoryForm {
        fn to_data(&self) -> CategoryData {
            CategoryData {
                title: self.title.trim().to_string(),
                description: self.description.trim().to_string(),
                slug: self.slug.trim().to_string(),
                is_published: checkbox(&self.is_published),
            }
        }
    }

    fn slug_taken(err: &DbError) -> bool {
        err.violated_constraint() == Some("categories_slug_key")
    }

    pub async fn list(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Query(query): Query<ListQuery>,
    ) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MANAGE_CATEGORIES)?;
        let mut conn = get_conn!(state);
        let categories = list_categories(
            query.q.as_deref(),
            flag_filter(&query.is_published),
            &mut conn,
        )
        .await?;
        Ok(Html(views::admin::categories(&ctx, &categories, &query)))
    }

    pub async fn new_form(admin: AdminSession, ctx: PageContext) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MANAGE_CATEGORIES)?;
        let data = CategoryForm {
            is_published: Some("on".to_string()),
            ..CategoryForm::default()
        };
        Ok(Html(views::admin::category_form(
            &ctx,
            "/admin/categories/new/",
            &data,
            &FormErrors::default(),
        )))
    }

    pub async fn create(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        ValidForm { data, mut errors }: ValidForm<CategoryForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MANAGE_CATEGORIES)?;
        let action = "/admin/categories/new/";
        if !errors.is_empty() {
            return Ok(
                Html(views::admin::category_form(&ctx, action, &data, &errors)).into_response(),
            );
        }

        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        match create_category(&data.to_data(), &mut tx).await {
            Ok(category_id) => {
                tx.commit().await?;
                info!("Admin {} created category {}", admin.0.user_id, category_id);
                Ok(redirect("/admin/categories/"))
            }
            Err(err) if slug_taken(&err) => {
                errors.add("slug", SLUG_TAKEN);
                Ok(Html(views::admin::category_form(&ctx, action, &data, &errors)).into_response())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn edit_form(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(category_id): Path<String>,
    ) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MANAGE_CATEGORIES)?;
        let category_id = parse_id(&category_id)?;
        let mut conn = get_conn!(state);
        let category = get_category(category_id, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;
        let data = CategoryForm {
            csrfmiddlewaretoken: String::new(),
            title: category.title,
            description: category.description,
            slug: category.slug,
            is_published: category.is_published.then(|| "on".to_string()),
        };
        Ok(Html(views::admin::category_form(
            &ctx,
            &format!("/admin/categories/{}/", category_id),
            &data,
            &FormErrors::default(),
        )))
    }

    pub async fn update(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(category_id): Path<String>,
        ValidForm { data, mut errors }: ValidForm<CategoryForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MANAGE_CATEGORIES)?;
        let category_id = parse_id(&category_id)?;
        let action = format!("/admin/categories/{}/", category_id);
        if !errors.is_empty() {
            return Ok(
                Html(views::admin::category_form(&ctx, &action, &data, &errors)).into_response(),
            );
        }

        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        match update_category(category_id, &data.to_data(), &mut tx).await {
            Ok(true) => {
                tx.commit().await?;
                Ok(redirect("/admin/categories/"))
            }
            Ok(false) => Err(AppError::NotFound),
            Err(err) if slug_taken(&err) => {
                errors.add("slug", SLUG_TAKEN);
                Ok(Html(views::admin::category_form(&ctx, &action, &data, &errors)).into_response())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete(
        admin: AdminSession,
        State(state): State<ArcAppState>,
        Path(category_id): Path<String>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MANAGE_CATEGORIES)?;
        let category_id = parse_id(&category_id)?;
        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        if !delete_category(category_id, &mut tx).await? {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;
        info!("Admin {} deleted category {}", admin.0.user_id, category_id);
        Ok(redirect("/admin/categories/"))
    }
}

mod locations {
    use super::*;
    use crate::database::locations::{
        create_location, delete_location, get_location, list_locations, update_location,
    };

    pub async fn list(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Query(query): Query<ListQuery>,
    ) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MANAGE_LOCATIONS)?;
        let mut conn = get_conn!(state);
        let locations = list_locations(
            query.q.as_deref(),
            flag_filter(&query.is_published),
            &mut conn,
        )
        .await?;
        Ok(Html(views::admin::locations(&ctx, &locations, &query)))
    }

    pub async fn new_form(admin: AdminSession, ctx: PageContext) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MANAGE_LOCATIONS)?;
        let data = LocationForm {
            is_published: Some("on".to_string()),
            ..LocationForm::default()
        };
        Ok(Html(views::admin::location_form(
            &ctx,
            "/admin/locations/new/",
            &data,
            &FormErrors::default(),
        )))
    }

    pub async fn create(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        ValidForm { data, errors }: ValidForm<LocationForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MANAGE_LOCATIONS)?;
        if !errors.is_empty() {
            return Ok(Html(views::admin::location_form(
                &ctx,
                "/admin/locations/new/",
                &data,
                &errors,
            ))
            .into_response());
        }

        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        let location_id =
            create_location(data.name.trim(), checkbox(&data.is_published), &mut tx).await?;
        tx.commit().await?;
        info!("Admin {} created location {}", admin.0.user_id, location_id);
        Ok(redirect("/admin/locations/"))
    }

    pub async fn edit_form(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(location_id): Path<String>,
    ) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MANAGE_LOCATIONS)?;
        let location_id = parse_id(&location_id)?;
        let mut conn = get_conn!(state);
        let location = get_location(location_id, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;
        let data = LocationForm {
            csrfmiddlewaretoken: String::new(),
            name: location.name,
            is_published: location.is_published.then(|| "on".to_string()),
        };
        Ok(Html(views::admin::location_form(
            &ctx,
            &format!("/admin/locations/{}/", location_id),
            &data,
            &FormErrors::default(),
        )))
    }

    pub async fn update(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(location_id): Path<String>,
        ValidForm { data, errors }: ValidForm<LocationForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MANAGE_LOCATIONS)?;
        let location_id = parse_id(&location_id)?;
        if !errors.is_empty() {
            let action = format!("/admin/locations/{}/", location_id);
            return Ok(
                Html(views::admin::location_form(&ctx, &action, &data, &errors)).into_response(),
            );
        }

        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        if !update_location(
            location_id,
            data.name.trim(),
            checkbox(&data.is_published),
            &mut tx,
        )
        .await?
        {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;
        Ok(redirect("/admin/locations/"))
    }

    pub async fn delete(
        admin: AdminSession,
        State(state): State<ArcAppState>,
        Path(location_id): Path<String>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MANAGE_LOCATIONS)?;
        let location_id = parse_id(&location_id)?;
        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        if !delete_location(location_id, &mut tx).await? {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;
        info!("Admin {} deleted location {}", admin.0.user_id, location_id);
        Ok(redirect("/admin/locations/"))
    }
}

mod comments {
    use super::*;
    use crate::database::comments::{delete_comment, list_moderated_comments};

    pub async fn list(
        admin: AdminSession,
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Query(query): Query<ListQuery>,
    ) -> Result<Html<String>, AppError> {
        require(&admin, Permission::MODERATE_COMMENTS)?;
        let mut conn = get_conn!(state);
        let (comments, window) = list_moderated_comments(
            query.q.as_deref(),
            query.page.as_deref(),
            state.config.posts_per_page,
            &mut conn,
        )
        .await?;
        Ok(Html(views::admin::comments(&ctx, &comments, &window, &query)))
    }

    pub async fn delete(
        admin: AdminSession,
        State(state): State<ArcAppState>,
        Path(comment_id): Path<String>,
        _confirm: ValidForm<ConfirmForm>,
    ) -> Result<Response, AppError> {
        require(&admin, Permission::MODERATE_COMMENTS)?;
        let comment_id = parse_id(&comment_id)?;
        let mut conn = get_conn!(state);
        let mut tx = create_tx!(conn);
        if !delete_comment(comment_id, &mut tx).await? {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;
        info!("Admin {} deleted comment {}", admin.0.user_id, comment_id);
        Ok(redirect("/admin/comments/"))
    }
}

pub fn router() -> Router<ArcAppState> {
    Router::new()
        .route("/admin/", get(dashboard::handler))
        .route("/admin/posts/", get(posts::list))
        .route("/admin/posts/{post_id}/", post(posts::moderate))
        .route("/admin/posts/{post_id}/delete/", post(posts::delete))
        .route("/admin/categories/", get(categories::list))
        .route(
            "/admin/categories/new/",
            get(categories::new_form).post(categories::create),
        )
        .route(
            "/admin/categories/{category_id}/",
            get(categories::edit_form).post(categories::update),
        )
        .route("/admin/categories/{category_id}/delete/", post(categories::delete))
        .route("/admin/locations/", get(locations::list))
        .route(
            "/admin/locations/new/",
            get(locations::new_form).post(locations::create),
        )
        .route(
            "/admin/locations/{location_id}/",
            get(locations::edit_form).post(locations::update),
        )
        .route("/admin/locations/{location_id}/delete/", post(locations::delete))
        .route("/admin/comments/", get(comments::list))
        .route("/admin/comments/{comment_id}/delete/", post(comments::delete))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_filters() {
        assert_eq!(flag_filter(&Some("1".into())), Some(true));
        assert_eq!(flag_filter(&Some("0".into())), Some(false));
        assert_eq!(flag_filter(&Some("".into())), None);
        assert_eq!(flag_filter(&None), None);
    }

    #[test]
    fn query_string_skips_empty_filters_and_encodes() {
        let query = PostsQuery {
            q: Some("hello world".into()),
            is_published: Some(String::new()),
            category: Some("5".into()),
            page: Some("3".into()),
            ..PostsQuery::default()
        };
        assert_eq!(query.query_string(), "q=hello%20world&category=5");
    }

    #[test]
    fn slug_rules() {
        let mut form = CategoryForm {
            title: "Travel".into(),
            description: "Trips".into(),
            slug: "travel-2024".into(),
            ..CategoryForm::default()
        };
        assert!(form.validate().is_ok());
        form.slug = "путешествия".into();
        assert!(form.validate().is_err());
        form.slug = "with space".into();
        assert!(form.validate().is_err());
    }

    #[test]
    fn blank_titles_and_names_are_rejected() {
        let category = CategoryForm {
            title: "  ".into(),
            description: " ".into(),
            slug: "travel".into(),
            ..CategoryForm::default()
        };
        let errors: FormErrors = category.validate().unwrap_err().into();
        assert_eq!(errors.field("title"), ["This field is required.".to_string()]);
        assert_eq!(errors.field("description"), ["This field is required.".to_string()]);

        let location = LocationForm {
            name: "\t".into(),
            ..LocationForm::default()
        };
        let errors: FormErrors = location.validate().unwrap_err().into();
        assert_eq!(errors.field("name"), ["This field is required.".to_string()]);
    }
}
