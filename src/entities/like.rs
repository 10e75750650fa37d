use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Body of the like toggle response.
///
/// On success `error` is absent and both counters are present; on failure
/// only `error` is set.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub total_likes: Option<i64>,
    #[serde(default)]
    pub liked: Option<bool>,
}

impl LikeResponse {
    pub fn toggled(total_likes: i64, liked: bool) -> Self {
        Self {
            error: None,
            total_likes: Some(total_likes),
            liked: Some(liked),
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_has_no_error_field() {
        let body = serde_json::to_value(LikeResponse::toggled(5, true)).unwrap();
        assert_eq!(body, serde_json::json!({ "total_likes": 5, "liked": true }));
    }

    #[test]
    fn error_body_has_only_error() {
        let body = serde_json::to_value(LikeResponse::error("not authenticated")).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "not authenticated" }));
    }

    #[test]
    fn null_error_reads_as_success() {
        let parsed: LikeResponse =
            serde_json::from_str(r#"{"error": null, "total_likes": 2, "liked": false}"#).unwrap();
        assert_eq!(parsed, LikeResponse::toggled(2, false));
    }
}
