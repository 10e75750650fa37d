use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone)]
pub struct Category {
    pub category_id: i64,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// The part of a category a post listing needs.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    pub category_id: i64,
    pub title: String,
    pub slug: String,
    pub is_published: bool,
}
