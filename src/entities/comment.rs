use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author_username: String,
    pub text: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Admin listing row; carries the post title for display.
#[derive(Serialize, Debug, Clone)]
pub struct ModeratedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub post_title: String,
}
