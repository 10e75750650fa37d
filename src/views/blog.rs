use chrono::{DateTime, Utc};

use crate::{
    endpoints::comments::CommentForm,
    entities::{category::Category, comment::Comment, post::Post, user::User},
    extractors::page::PageContext,
    utils::{pagination::PageWindow, storage::normalize_url, validate::FormErrors},
    views::{
        escape, format_date, forms::comment_form, layout, pagination,
    },
    widget::{
        LIKE_CONTROL_CLASS, POST_ID_ATTRIBUTE, control_element_id, count_element_id, glyph,
    },
};

/// Like button plus counter, addressable by the like widget.
pub fn like_control(post: &Post) -> String {
    let id = post.post_id.to_string();
    format!(
        r#"<button type="button" class="{class}" id="{control_id}" {attr}="{id}" aria-label="Like">{glyph}</button> <span id="{count_id}">{count}</span>"#,
        class = LIKE_CONTROL_CLASS,
        control_id = control_element_id(&id),
        attr = POST_ID_ATTRIBUTE,
        id = id,
        glyph = glyph(post.liked),
        count_id = count_element_id(&id),
        count = post.likes_count,
    )
}

fn post_meta(post: &Post, now: DateTime<Utc>) -> String {
    let mut meta = format!(
        r#"<a href="/profile/{}/">@{}</a> · {}"#,
        urlencoding::encode(&post.author_username),
        escape(&post.author_username),
        format_date(&post.pub_date)
    );
    if let Some(category) = &post.category {
        meta.push_str(&format!(
            r#" · <a href="/category/{}/">{}</a>"#,
            escape(&category.slug),
            escape(&category.title)
        ));
    }
    if let Some(location) = post.location.as_ref().filter(|l| l.is_published) {
        meta.push_str(&format!(" · {}", escape(&location.name)));
    }
    if !post.is_published {
        meta.push_str(r#" <span class="badge">hidden</span>"#);
    }
    if post.is_deferred(now) {
        meta.push_str(r#" <span class="badge">scheduled</span>"#);
    }
    meta
}

fn post_image(post: &Post, media_url: &str) -> String {
    normalize_url(post.image.clone(), media_url)
        .map(|src| format!(r#"<img src="{}" alt="{}">"#, escape(&src), escape(&post.title)))
        .unwrap_or_default()
}

/// Listing entry: title, meta line, image and the first paragraph.
pub fn post_card(post: &Post, now: DateTime<Utc>, media_url: &str) -> String {
    let excerpt: String = post.text.lines().next().unwrap_or_default().to_string();
    format!(
        concat!(
            r#"<article class="post-card">"#,
            r#"<h2><a href="/posts/{id}/">{title}</a></h2>"#,
            r#"<p class="post-meta">{meta}</p>{image}<p>{excerpt}</p>"#,
            r#"<p class="post-meta">{like} · <a href="/posts/{id}/#comments">{comments} comments</a></p>"#,
            "</article>"
        ),
        id = post.post_id,
        title = escape(&post.title),
        meta = post_meta(post, now),
        image = post_image(post, media_url),
        excerpt = escape(&excerpt),
        like = like_control(post),
        comments = post.comment_count,
    )
}

fn post_list(posts: &[Post], window: &PageWindow, media_url: &str) -> String {
    let now = Utc::now();
    if posts.is_empty() {
        return r#"<p class="post-meta">Nothing here yet.</p>"#.to_string();
    }
    let mut out: String = posts.iter().map(|p| post_card(p, now, media_url)).collect();
    out.push_str(&pagination(window, ""));
    out
}

pub fn index(ctx: &PageContext, posts: &[Post], window: &PageWindow, media_url: &str) -> String {
    let content = format!("<h1>Latest posts</h1>{}", post_list(posts, window, media_url));
    layout(ctx, "Latest posts", &content)
}

pub fn category(
    ctx: &PageContext,
    category: &Category,
    posts: &[Post],
    window: &PageWindow,
    media_url: &str,
) -> String {
    let content = format!(
        "<h1>{}</h1><p>{}</p>{}",
        escape(&category.title),
        escape(&category.description),
        post_list(posts, window, media_url)
    );
    layout(ctx, &category.title, &content)
}

pub fn profile(
    ctx: &PageContext,
    user: &User,
    posts: &[Post],
    window: &PageWindow,
    media_url: &str,
) -> String {
    let is_owner = ctx.viewer_id() == Some(user.user_id);
    let owner_links = if is_owner {
        format!(
            r#"<p><a href="/profile/edit_profile/">Edit profile</a> · <a href="/profile/{}/password/">Change password</a></p>"#,
            urlencoding::encode(&user.username)
        )
    } else {
        String::new()
    };
    let name = user.full_name();
    let content = format!(
        r#"<h1>@{username}</h1><p class="post-meta">{name}Member since {joined}</p>{links}<h2>Posts</h2>{posts}"#,
        username = escape(&user.username),
        name = if name.is_empty() {
            String::new()
        } else {
            format!("{} · ", escape(&name))
        },
        joined = user.created_at.format("%d %B %Y"),
        links = owner_links,
        posts = post_list(posts, window, media_url),
    );
    layout(ctx, &user.username, &content)
}

fn comment_item(ctx: &PageContext, comment: &Comment) -> String {
    let actions = if ctx.viewer_id() == Some(comment.author_id) {
        format!(
            r#" · <a href="/posts/{post}/comment/{id}/edit_comment/">edit</a> · <a href="/posts/{post}/comment/{id}/delete_comment/">delete</a>"#,
            post = comment.post_id,
            id = comment.comment_id
        )
    } else {
        String::new()
    };
    format!(
        r#"<li id="comment-{id}"><p class="post-meta">@{author} · {at}{actions}</p><p>{text}</p></li>"#,
        id = comment.comment_id,
        author = escape(&comment.author_username),
        at = format_date(&comment.created_at),
        actions = actions,
        text = escape(&comment.text),
    )
}

pub fn post_detail(
    ctx: &PageContext,
    post: &Post,
    comments: &[Comment],
    form: &CommentForm,
    errors: &FormErrors,
    media_url: &str,
) -> String {
    let now = Utc::now();
    let author_links = if ctx.viewer_id() == Some(post.author_id) {
        format!(
            r#"<p><a href="/posts/{id}/edit/">Edit</a> · <a href="/posts/{id}/delete/">Delete</a></p>"#,
            id = post.post_id
        )
    } else {
        String::new()
    };
    let paragraphs: String = post
        .text
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>", escape(p.trim()).replace('\n', "<br>")))
        .collect();
    let comment_list: String = comments.iter().map(|c| comment_item(ctx, c)).collect();
    let comment_box = if ctx.viewer.is_some() {
        comment_form(ctx, &format!("/posts/{}/comment/", post.post_id), form, errors)
    } else {
        r#"<p><a href="/auth/login/">Log in</a> to leave a comment.</p>"#.to_string()
    };

    let content = format!(
        concat!(
            r#"<article class="post-card"><h1>{title}</h1><p class="post-meta">{meta}</p>"#,
            "{image}{text}<p>{like}</p>{author_links}</article>",
            r#"<section id="comments"><h2>Comments ({count})</h2><ul>{comments}</ul>{comment_box}</section>"#
        ),
        title = escape(&post.title),
        meta = post_meta(post, now),
        image = post_image(post, media_url),
        text = paragraphs,
        like = like_control(post),
        author_links = author_links,
        count = comments.len(),
        comments = comment_list,
        comment_box = comment_box,
    );
    layout(ctx, &post.title, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::post::tests::post;
    use crate::widget::{
        LikeControl, LikeWidget, NOT_LIKED_GLYPH, Transport, ToggleRequest, WidgetError,
        dom::MemoryDocument,
    };
    use crate::entities::like::LikeResponse;
    use std::sync::Arc;

    #[test]
    fn like_control_follows_widget_contract() {
        let mut p = post(1);
        p.likes_count = 4;
        let html = like_control(&p);
        assert!(html.contains(r#"class="like-button""#));
        assert!(html.contains(r#"data-post-id="42""#));
        assert!(html.contains(r#"<span id="likes-count-42">4</span>"#));
        assert!(html.contains(NOT_LIKED_GLYPH));
    }

    #[test]
    fn card_escapes_user_content() {
        let mut p = post(1);
        p.title = "<b>bold</b>".to_string();
        let html = post_card(&p, Utc::now(), "/media");
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(!html.contains("<b>bold"));
    }

    struct Fixed;

    impl Transport for Fixed {
        async fn toggle(&self, request: ToggleRequest) -> Result<LikeResponse, WidgetError> {
            assert_eq!(request.path, "/posts/42/like/");
            Ok(LikeResponse::toggled(5, true))
        }
    }

    #[tokio::test]
    async fn widget_drives_a_rendered_page() {
        let ctx = PageContext::anonymous("tok");
        let now = Utc::now();
        let html = layout(&ctx, "t", &post_card(&post(1), now, "/media"));
        let doc = Arc::new(MemoryDocument::from_html("csrftoken=tok", &html));

        let controls: Vec<LikeControl> = doc.like_controls();
        assert_eq!(controls.len(), 1);

        let widget = LikeWidget::new(doc.clone(), Arc::new(Fixed));
        widget.init(controls.clone());
        widget.click(&controls[0].element_id).await;

        assert_eq!(doc.text("likes-count-42").as_deref(), Some("5"));
        assert_eq!(doc.text("like-button-42").as_deref(), Some(crate::widget::LIKED_GLYPH));
    }
}
