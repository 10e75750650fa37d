//! Server side HTML. Pages are built from escaped fragments and poured into
//! the layout template.

pub mod admin;
pub mod blog;
pub mod forms;
pub mod pages;

use chrono::{DateTime, Utc};

use crate::{extractors::page::PageContext, utils::pagination::PageWindow};

const BASE_TEMPLATE: &str = include_str!("../../resources/templates/base.html");

/// Display strings in listings are cut to this many words.
pub const LIMIT_OF_WORDS: usize = 10;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// First `limit` words of `s`, with an ellipsis when something was cut.
pub fn truncate_words(s: &str, limit: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= limit {
        return words.join(" ");
    }
    format!("{} …", words[..limit].join(" "))
}

pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%d %B %Y, %H:%M").to_string()
}

/// Replaces `{{ key }}` markers of a template in one pass.
///
/// Values are inserted verbatim and never scanned again, so markers inside
/// user content stay as they are.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + len].trim();
        out.push_str(&rest[..start]);
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + len + 2]),
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

fn nav(ctx: &PageContext) -> String {
    match &ctx.viewer {
        Some(viewer) => {
            let admin = if ctx.is_admin() {
                r#"<a href="/admin/">Admin</a>"#
            } else {
                ""
            };
            format!(
                concat!(
                    r#"<a href="/posts/create/">New post</a>"#,
                    r#"<a href="/profile/{username_url}/">{username}</a>{admin}"#,
                    r#"<form method="post" action="/auth/logout/">{csrf}<button type="submit">Log out</button></form>"#
                ),
                username_url = urlencoding::encode(&viewer.username),
                username = escape(&viewer.username),
                admin = admin,
                csrf = csrf_input(&ctx.csrf_token),
            )
        }
        None => concat!(
            r#"<a href="/auth/login/">Log in</a>"#,
            r#"<a href="/auth/registration/">Sign up</a>"#
        )
        .to_string(),
    }
}

pub fn csrf_input(token: &str) -> String {
    format!(
        r#"<input type="hidden" name="csrfmiddlewaretoken" value="{}">"#,
        escape(token)
    )
}

/// Whole page around `content`, which must already be escaped markup.
pub fn layout(ctx: &PageContext, title: &str, content: &str) -> String {
    fill(
        BASE_TEMPLATE,
        &[
            ("title", &escape(title)),
            ("csrf_token", &escape(&ctx.csrf_token)),
            ("nav", &nav(ctx)),
            ("content", content),
        ],
    )
}

/// Previous/next links keeping the rest of the query string.
pub fn pagination(window: &PageWindow, base_query: &str) -> String {
    if window.num_pages <= 1 {
        return String::new();
    }
    let link = |page: u32, label: &str| {
        let sep = if base_query.is_empty() { "" } else { "&" };
        let query = format!("{}{}page={}", base_query, sep, page);
        format!(r#"<a href="?{}">{}</a>"#, escape(&query), label)
    };

    let mut out = String::from(r#"<nav class="pagination">"#);
    if window.has_previous() {
        out.push_str(&link(1, "« first"));
        out.push_str(&link(window.number - 1, "previous"));
    }
    out.push_str(&format!(
        "<span>Page {} of {}</span>",
        window.number, window.num_pages
    ));
    if window.has_next() {
        out.push_str(&link(window.number + 1, "next"));
        out.push_str(&link(window.num_pages, "last »"));
    }
    out.push_str("</nav>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::pagination::paginate;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn fill_is_single_pass() {
        let out = fill(
            "<h1>{{ title }}</h1>{{content}}{{ unknown }}",
            &[("title", "{{ content }}"), ("content", "body")],
        );
        assert_eq!(out, "<h1>{{ content }}</h1>body{{ unknown }}");
    }

    #[test]
    fn fill_keeps_unterminated_marker() {
        assert_eq!(fill("a {{ b", &[("b", "x")]), "a {{ b");
    }

    #[test]
    fn truncates_to_word_limit() {
        assert_eq!(truncate_words("one two  three", 5), "one two three");
        assert_eq!(truncate_words("a b c d", 2), "a b …");
    }

    #[test]
    fn layout_escapes_title_and_shows_login_links() {
        let ctx = PageContext::anonymous("tok");
        let html = layout(&ctx, "<script>", "<p>ok</p>");
        assert!(html.contains("<title>&lt;script&gt; | Blogicum</title>"));
        assert!(html.contains("<p>ok</p>"));
        assert!(html.contains(r#"href="/auth/login/""#));
        assert!(html.contains(r#"content="tok""#));
    }

    #[test]
    fn pagination_links_only_when_needed() {
        assert_eq!(pagination(&paginate(5, 10, None), ""), "");
        let html = pagination(&paginate(30, 10, Some("2")), "q=x");
        assert!(html.contains(r#"href="?q=x&amp;page=1""#));
        assert!(html.contains(r#"href="?q=x&amp;page=3""#));
        assert!(html.contains("Page 2 of 3"));
    }
}
