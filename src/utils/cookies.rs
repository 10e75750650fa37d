use axum::http::{HeaderMap, header::COOKIE};

pub const CSRF_COOKIE: &str = "csrftoken";
pub const SESSION_COOKIE: &str = "sessionid";

/// First value stored under `name` in a raw `Cookie` string, or an empty
/// string when there is none.
pub fn cookie_value(raw: &str, name: &str) -> String {
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .unwrap_or_default()
}

/// Looks through every `Cookie` header of a request.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|raw| cookie_value(raw, name))
        .find(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub max_age: Option<u64>,
}

pub fn set_cookie(name: &str, value: &str, opts: CookieOptions) -> String {
    let mut cookie = format!("{}={}; Path=/; SameSite=Lax", name, value);
    if let Some(max_age) = opts.max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if opts.http_only {
        cookie.push_str("; HttpOnly");
    }
    if opts.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn expire_cookie(name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0; SameSite=Lax", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_first_matching_value() {
        let raw = "theme=dark; csrftoken=abc123; csrftoken=zzz";
        assert_eq!(cookie_value(raw, "csrftoken"), "abc123");
        assert_eq!(cookie_value(raw, "theme"), "dark");
    }

    #[test]
    fn missing_or_empty_input_yields_empty() {
        assert_eq!(cookie_value("", "csrftoken"), "");
        assert_eq!(cookie_value("a=1; b=2", "csrftoken"), "");
        assert_eq!(cookie_value("novalue; csrftoken", "csrftoken"), "");
    }

    #[test]
    fn name_must_match_exactly() {
        assert_eq!(cookie_value("xcsrftoken=1; csrftoken=2", "csrftoken"), "2");
        assert_eq!(cookie_value("csrftoken2=1", "csrftoken"), "");
    }

    #[test]
    fn keeps_equals_signs_inside_value() {
        assert_eq!(cookie_value("t=a=b=", "t"), "a=b=");
        assert_eq!(cookie_value("t=\"quoted\"", "t"), "quoted");
    }

    #[test]
    fn request_cookie_scans_all_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("sessionid=xyz"));
        assert_eq!(request_cookie(&headers, SESSION_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(request_cookie(&headers, CSRF_COOKIE), None);
    }

    #[test]
    fn builds_set_cookie_header() {
        let header = set_cookie(
            SESSION_COOKIE,
            "v",
            CookieOptions {
                http_only: true,
                secure: false,
                max_age: Some(60),
            },
        );
        assert_eq!(header, "sessionid=v; Path=/; SameSite=Lax; Max-Age=60; HttpOnly");
    }
}
