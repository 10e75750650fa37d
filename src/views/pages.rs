use crate::{
    extractors::page::PageContext,
    views::{escape, layout},
};

fn error_page(title: &str, body: &str) -> String {
    layout(&PageContext::anonymous(""), title, body)
}

pub fn not_found() -> String {
    error_page(
        "Page not found",
        r#"<h1>404</h1><p>This page does not exist or was removed.</p><p><a href="/">Back to the front page</a></p>"#,
    )
}

pub fn csrf_failure(reason: &str) -> String {
    error_page(
        "Forbidden",
        &format!(
            "<h1>403</h1><p>The request was rejected by the anti-forgery check.</p><p class=\"post-meta\">{}</p>",
            escape(reason)
        ),
    )
}

pub fn bad_request(reason: &str) -> String {
    error_page(
        "Bad request",
        &format!(
            "<h1>400</h1><p>The submitted data could not be read.</p><p class=\"post-meta\">{}</p>",
            escape(reason)
        ),
    )
}

pub fn server_error() -> String {
    error_page(
        "Server error",
        "<h1>500</h1><p>Something went wrong on our side. Please try again later.</p>",
    )
}
