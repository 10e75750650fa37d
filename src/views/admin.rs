use crate::{
    endpoints::admin::{CategoryForm, ListQuery, LocationForm, PostsQuery},
    entities::{
        category::Category, comment::ModeratedComment, location::Location, post::Post,
    },
    extractors::page::PageContext,
    utils::{pagination::PageWindow, validate::{FormErrors, checkbox}},
    views::{
        LIMIT_OF_WORDS, csrf_input, escape, format_date,
        forms::{checkbox_input, form, input, select},
        layout, pagination, truncate_words,
    },
};

#[derive(Debug, Clone, Copy)]
pub struct Counts {
    pub posts: i64,
    pub comments: i64,
    pub users: i64,
    pub categories: usize,
    pub locations: usize,
}

pub struct PostsList<'a> {
    pub posts: &'a [Post],
    pub window: &'a PageWindow,
    pub query: &'a PostsQuery,
    pub categories: &'a [Category],
    pub locations: &'a [Location],
    pub authors: &'a [(i64, String)],
}

const SECTIONS: [(&str, &str); 4] = [
    ("/admin/posts/", "Posts"),
    ("/admin/categories/", "Categories"),
    ("/admin/locations/", "Locations"),
    ("/admin/comments/", "Comments"),
];

fn admin_page(ctx: &PageContext, title: &str, body: &str) -> String {
    let links: String = SECTIONS
        .iter()
        .map(|(href, label)| format!(r#"<a href="{}">{}</a> "#, href, label))
        .collect();
    let content = format!(
        r#"<p class="post-meta"><a href="/admin/">Admin</a> · {}</p><h1>{}</h1>{}"#,
        links,
        escape(title),
        body
    );
    layout(ctx, title, &content)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// GET form with a search box and a yes/no `is_published` filter.
fn search_bar(action: &str, q: &Option<String>, is_published: &Option<String>, extra: &str) -> String {
    let current = is_published.as_deref().unwrap_or_default();
    let option = |value: &str, label: &str| {
        format!(
            r#"<option value="{}"{}>{}</option>"#,
            value,
            if value == current { " selected" } else { "" },
            label
        )
    };
    format!(
        concat!(
            r#"<form method="get" action="{action}" class="filters">"#,
            r#"<input type="search" name="q" value="{q}" placeholder="Starts with…">"#,
            r#"<select name="is_published">{any}{yes}{no}</select>{extra}"#,
            r#"<button type="submit">Filter</button></form>"#
        ),
        action = action,
        q = escape(q.as_deref().unwrap_or_default()),
        any = option("", "published: any"),
        yes = option("1", "published: yes"),
        no = option("0", "published: no"),
        extra = extra,
    )
}

fn delete_button(ctx: &PageContext, action: &str) -> String {
    format!(
        r#"<form method="post" action="{}" class="inline">{}<button type="submit">Delete</button></form>"#,
        escape(action),
        csrf_input(&ctx.csrf_token)
    )
}

pub fn dashboard(ctx: &PageContext, counts: &Counts, permissions: &[&str]) -> String {
    let body = format!(
        concat!(
            "<ul>",
            r#"<li><a href="/admin/posts/">Posts</a>: {posts}</li>"#,
            r#"<li><a href="/admin/categories/">Categories</a>: {categories}</li>"#,
            r#"<li><a href="/admin/locations/">Locations</a>: {locations}</li>"#,
            r#"<li><a href="/admin/comments/">Comments</a>: {comments}</li>"#,
            "<li>Users: {users}</li>",
            "</ul>",
            r#"<p class="post-meta">Your permissions: {permissions}</p>"#
        ),
        permissions = escape(&permissions.join(", ")),
        posts = counts.posts,
        categories = counts.categories,
        locations = counts.locations,
        comments = counts.comments,
        users = counts.users,
    );
    admin_page(ctx, "Administration", &body)
}

pub fn posts(ctx: &PageContext, list: &PostsList<'_>) -> String {
    let categories: Vec<(i64, String)> = list
        .categories
        .iter()
        .map(|c| (c.category_id, c.title.clone()))
        .collect();
    let locations: Vec<(i64, String)> = list
        .locations
        .iter()
        .map(|l| (l.location_id, l.name.clone()))
        .collect();
    let no_errors = FormErrors::default();

    let filters = [
        select("Category", "category", &categories, list.query.category.as_deref(), &no_errors),
        select("Location", "location", &locations, list.query.location.as_deref(), &no_errors),
        select("Author", "author", list.authors, list.query.author.as_deref(), &no_errors),
    ]
    .concat();

    let rows: String = list
        .posts
        .iter()
        .map(|post| {
            let category = post.category.as_ref().map(|c| c.category_id.to_string());
            let location = post.location.as_ref().map(|l| l.location_id.to_string());
            let inline = [
                checkbox_input("Published", "is_published", post.is_published),
                select("Category", "category", &categories, category.as_deref(), &no_errors),
                select("Location", "location", &locations, location.as_deref(), &no_errors),
            ]
            .concat();
            format!(
                concat!(
                    "<tr><td><a href=\"/posts/{id}/\">{title}</a></td><td>{author}</td><td>{date}</td>",
                    "<td>{inline}</td><td>{delete}</td></tr>"
                ),
                id = post.post_id,
                title = escape(&truncate_words(&post.title, LIMIT_OF_WORDS)),
                author = escape(&post.author_username),
                date = format_date(&post.pub_date),
                inline = form(
                    ctx,
                    &format!("/admin/posts/{}/", post.post_id),
                    &inline,
                    &no_errors,
                    "Save"
                ),
                delete = delete_button(ctx, &format!("/admin/posts/{}/delete/", post.post_id)),
            )
        })
        .collect();

    let body = format!(
        concat!(
            "{filters}",
            "<table class=\"admin\"><thead><tr><th>Title</th><th>Author</th><th>Published at</th>",
            "<th>Moderation</th><th></th></tr></thead><tbody>{rows}</tbody></table>{pages}"
        ),
        filters = search_bar(
            "/admin/posts/",
            &list.query.q,
            &list.query.is_published,
            &filters
        ),
        rows = rows,
        pages = pagination(list.window, &list.query.query_string()),
    );
    admin_page(ctx, "Posts", &body)
}

pub fn categories(ctx: &PageContext, categories: &[Category], query: &ListQuery) -> String {
    let rows: String = categories
        .iter()
        .map(|c| {
            format!(
                concat!(
                    r#"<tr><td><a href="/admin/categories/{id}/">{title}</a></td><td>{slug}</td>"#,
                    "<td>{published}</td><td>{delete}</td></tr>"
                ),
                id = c.category_id,
                title = escape(&truncate_words(&c.title, LIMIT_OF_WORDS)),
                slug = escape(&c.slug),
                published = yes_no(c.is_published),
                delete = delete_button(ctx, &format!("/admin/categories/{}/delete/", c.category_id)),
            )
        })
        .collect();
    let body = format!(
        concat!(
            r#"{search}<p><a href="/admin/categories/new/">Add category</a></p>"#,
            "<table class=\"admin\"><thead><tr><th>Title</th><th>Slug</th><th>Published</th><th></th></tr></thead>",
            "<tbody>{rows}</tbody></table>"
        ),
        search = search_bar("/admin/categories/", &query.q, &query.is_published, ""),
        rows = rows,
    );
    admin_page(ctx, "Categories", &body)
}

pub fn category_form(ctx: &PageContext, action: &str, data: &CategoryForm, errors: &FormErrors) -> String {
    let fields = [
        input("Title", "title", "text", &data.title, errors),
        input("Description", "description", "text", &data.description, errors),
        input("Slug", "slug", "text", &data.slug, errors),
        checkbox_input("Published", "is_published", checkbox(&data.is_published)),
    ]
    .concat();
    admin_page(ctx, "Category", &form(ctx, action, &fields, errors, "Save"))
}

pub fn locations(ctx: &PageContext, locations: &[Location], query: &ListQuery) -> String {
    let rows: String = locations
        .iter()
        .map(|l| {
            format!(
                r#"<tr><td><a href="/admin/locations/{id}/">{name}</a></td><td>{published}</td><td>{delete}</td></tr>"#,
                id = l.location_id,
                name = escape(&truncate_words(&l.name, LIMIT_OF_WORDS)),
                published = yes_no(l.is_published),
                delete = delete_button(ctx, &format!("/admin/locations/{}/delete/", l.location_id)),
            )
        })
        .collect();
    let body = format!(
        concat!(
            r#"{search}<p><a href="/admin/locations/new/">Add location</a></p>"#,
            "<table class=\"admin\"><thead><tr><th>Name</th><th>Published</th><th></th></tr></thead>",
            "<tbody>{rows}</tbody></table>"
        ),
        search = search_bar("/admin/locations/", &query.q, &query.is_published, ""),
        rows = rows,
    );
    admin_page(ctx, "Locations", &body)
}

pub fn location_form(ctx: &PageContext, action: &str, data: &LocationForm, errors: &FormErrors) -> String {
    let fields = [
        input("Name", "name", "text", &data.name, errors),
        checkbox_input("Published", "is_published", checkbox(&data.is_published)),
    ]
    .concat();
    admin_page(ctx, "Location", &form(ctx, action, &fields, errors, "Save"))
}

pub fn comments(
    ctx: &PageContext,
    comments: &[ModeratedComment],
    window: &PageWindow,
    query: &ListQuery,
) -> String {
    let rows: String = comments
        .iter()
        .map(|m| {
            let c = &m.comment;
            format!(
                concat!(
                    r#"<tr><td>{text}</td><td><a href="/posts/{post_id}/">{post}</a></td>"#,
                    "<td>{author}</td><td>{at}</td><td>{delete}</td></tr>"
                ),
                text = escape(&truncate_words(&c.text, LIMIT_OF_WORDS)),
                post_id = c.post_id,
                post = escape(&truncate_words(&m.post_title, LIMIT_OF_WORDS)),
                author = escape(&c.author_username),
                at = format_date(&c.created_at),
                delete = delete_button(ctx, &format!("/admin/comments/{}/delete/", c.comment_id)),
            )
        })
        .collect();
    let search = format!(
        r#"<form method="get" action="/admin/comments/" class="filters"><input type="search" name="q" value="{}" placeholder="Author starts with…"><button type="submit">Filter</button></form>"#,
        escape(query.q.as_deref().unwrap_or_default())
    );
    let base_query = crate::endpoints::admin::query_string(&[("q", &query.q)]);
    let body = format!(
        concat!(
            "{search}<table class=\"admin\"><thead><tr><th>Text</th><th>Post</th><th>Author</th><th>Written</th>",
            "<th></th></tr></thead><tbody>{rows}</tbody></table>{pages}"
        ),
        search = search,
        rows = rows,
        pages = pagination(window, &base_query),
    );
    admin_page(ctx, "Comments", &body)
}
