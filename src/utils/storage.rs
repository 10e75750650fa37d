/// Absolute URLs pass through, anything else is resolved against `media_url`.
pub fn normalize_url(url: Option<String>, media_url: &str) -> Option<String> {
    match url {
        Some(u) if u.trim().is_empty() => None,
        Some(u) if !u.contains("://") && !u.starts_with('/') => Some(format!(
            "{}/{}",
            media_url.trim_end_matches('/'),
            u.trim_start_matches("./")
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_land_under_media() {
        assert_eq!(
            normalize_url(Some("posts/cat.png".into()), "/media/"),
            Some("/media/posts/cat.png".into())
        );
    }

    #[test]
    fn absolute_urls_are_untouched() {
        assert_eq!(
            normalize_url(Some("https://cdn.example/x.png".into()), "/media"),
            Some("https://cdn.example/x.png".into())
        );
        assert_eq!(
            normalize_url(Some("/static/x.png".into()), "/media"),
            Some("/static/x.png".into())
        );
        assert_eq!(normalize_url(Some("  ".into()), "/media"), None);
        assert_eq!(normalize_url(None, "/media"), None);
    }
}
