use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::entities::{category::CategoryRef, location::LocationRef};

#[skip_serializing_none]
#[derive(Serialize, Debug, Clone)]
pub struct Post {
    pub post_id: i64,
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub author_id: i64,
    pub author_username: String,
    pub category: Option<CategoryRef>,
    pub location: Option<LocationRef>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub comment_count: i64,
    pub likes_count: i64,
    /// Whether the viewer the post was loaded for likes it.
    pub liked: bool,
}

impl Post {
    /// Readers other than the author only see posts that are published, due
    /// and filed under a published category.
    pub fn is_publicly_visible(&self, now: DateTime<Utc>) -> bool {
        self.is_published
            && self.pub_date <= now
            && self.category.as_ref().is_some_and(|c| c.is_published)
    }

    pub fn visible_to(&self, viewer: Option<i64>, now: DateTime<Utc>) -> bool {
        viewer == Some(self.author_id) || self.is_publicly_visible(now)
    }

    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.pub_date > now
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn post(author_id: i64) -> Post {
        Post {
            post_id: 42,
            title: "Hello".to_string(),
            text: "World".to_string(),
            image: None,
            pub_date: Utc::now() - Duration::hours(1),
            author_id,
            author_username: "author".to_string(),
            category: Some(CategoryRef {
                category_id: 1,
                title: "Travel".to_string(),
                slug: "travel".to_string(),
                is_published: true,
            }),
            location: None,
            is_published: true,
            created_at: Utc::now() - Duration::hours(2),
            comment_count: 0,
            likes_count: 0,
            liked: false,
        }
    }

    #[test]
    fn published_due_post_is_visible() {
        assert!(post(1).is_publicly_visible(Utc::now()));
    }

    #[test]
    fn deferred_post_is_hidden_until_due() {
        let mut p = post(1);
        p.pub_date = Utc::now() + Duration::days(1);
        assert!(p.is_deferred(Utc::now()));
        assert!(!p.is_publicly_visible(Utc::now()));
        assert!(p.is_publicly_visible(Utc::now() + Duration::days(2)));
    }

    #[test]
    fn unpublished_post_or_category_hides_post() {
        let mut p = post(1);
        p.is_published = false;
        assert!(!p.is_publicly_visible(Utc::now()));

        let mut p = post(1);
        if let Some(c) = p.category.as_mut() {
            c.is_published = false;
        }
        assert!(!p.is_publicly_visible(Utc::now()));
    }

    #[test]
    fn uncategorized_post_is_not_public() {
        let mut p = post(1);
        p.category = None;
        assert!(!p.is_publicly_visible(Utc::now()));
    }

    #[test]
    fn author_always_sees_own_post() {
        let mut p = post(7);
        p.is_published = false;
        assert!(p.visible_to(Some(7), Utc::now()));
        assert!(!p.visible_to(Some(8), Utc::now()));
        assert!(!p.visible_to(None, Utc::now()));
    }
}
