use axum::{
    Router,
    extract::{Path, Query, State},
    response::Html,
    routing::get,
};
use chrono::Utc;

use crate::{
    database::{
        conn::LazyConn,
        posts::{PostFilter, PostScope, count_posts, list_posts},
    },
    entities::post::Post,
    extractors::page::PageContext,
    get_conn,
    utils::{
        pagination::{Page, PageQuery, paginate},
        response::{AppError, parse_id},
        state::ArcAppState,
    },
    views,
};

/// Counts, picks the page and loads it, like every listing does.
pub async fn load_page(
    filter: PostFilter,
    query: &PageQuery,
    viewer: Option<i64>,
    state: &ArcAppState,
    conn: &mut LazyConn,
) -> Result<Page<Post>, AppError> {
    let total = count_posts(filter, conn).await?;
    let window = paginate(total, state.config.posts_per_page, query.page.as_deref());
    let items = list_posts(filter, &window, viewer, conn).await?;
    Ok(Page { items, window })
}

mod index {
    use super::*;

    pub async fn handler(
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Query(query): Query<PageQuery>,
    ) -> Result<Html<String>, AppError> {
        let mut conn = get_conn!(state);
        let page = load_page(
            PostFilter::public(PostScope::All),
            &query,
            ctx.viewer_id(),
            &state,
            &mut conn,
        )
        .await?;

        Ok(Html(views::blog::index(
            &ctx,
            &page.items,
            &page.window,
            &state.config.media_url,
        )))
    }
}

mod category_posts {
    use super::*;
    use crate::database::categories::get_published_category;

    pub async fn handler(
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(slug): Path<String>,
        Query(query): Query<PageQuery>,
    ) -> Result<Html<String>, AppError> {
        let mut conn = get_conn!(state);
        let category = get_published_category(&slug, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;

        let page = load_page(
            PostFilter::public(PostScope::Category(category.category_id)),
            &query,
            ctx.viewer_id(),
            &state,
            &mut conn,
        )
        .await?;

        Ok(Html(views::blog::category(
            &ctx,
            &category,
            &page.items,
            &page.window,
            &state.config.media_url,
        )))
    }
}

mod post_detail {
    use super::*;
    use crate::{
        database::{comments::list_comments, posts::get_post},
        endpoints::comments::CommentForm,
        utils::validate::FormErrors,
    };

    pub async fn handler(
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(post_id): Path<String>,
    ) -> Result<Html<String>, AppError> {
        let post_id = parse_id(&post_id)?;
        let mut conn = get_conn!(state);

        let post = get_post(post_id, ctx.viewer_id(), &mut conn)
            .await?
            .filter(|p| p.visible_to(ctx.viewer_id(), Utc::now()))
            .ok_or(AppError::NotFound)?;
        let comments = list_comments(post_id, &mut conn).await?;

        Ok(Html(views::blog::post_detail(
            &ctx,
            &post,
            &comments,
            &CommentForm::default(),
            &FormErrors::default(),
            &state.config.media_url,
        )))
    }
}

mod profile {
    use super::*;
    use crate::database::users::get_user_by_username;

    pub async fn handler(
        ctx: PageContext,
        State(state): State<ArcAppState>,
        Path(username): Path<String>,
        Query(query): Query<PageQuery>,
    ) -> Result<Html<String>, AppError> {
        let mut conn = get_conn!(state);
        let user = get_user_by_username(&username, &mut conn)
            .await?
            .ok_or(AppError::NotFound)?;

        // owners see drafts, scheduled and hidden posts too
        let scope = PostScope::Author(user.user_id);
        let filter = if ctx.viewer_id() == Some(user.user_id) {
            PostFilter::everything(scope)
        } else {
            PostFilter::public(scope)
        };
        let page = load_page(filter, &query, ctx.viewer_id(), &state, &mut conn).await?;

        Ok(Html(views::blog::profile(
            &ctx,
            &user,
            &page.items,
            &page.window,
            &state.config.media_url,
        )))
    }
}

pub fn router() -> Router<ArcAppState> {
    Router::new()
        .route("/", get(index::handler))
        .route("/category/{slug}/", get(category_posts::handler))
        .route("/posts/{post_id}/", get(post_detail::handler))
        .route("/profile/{username}/", get(profile::handler))
}
