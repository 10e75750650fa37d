use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::{category::CategoryRef, location::LocationRef, post::Post},
    utils::{pagination::PageWindow, snowflake::generate_id},
};

/// `$1` is the viewer id (nullable) used for the `liked` column.
pub static POST_SQL: &str = "
    SELECT p.post_id, p.title, p.text, p.image, p.pub_date,
           p.is_published, p.created_at,
           p.author_id, u.username AS author_username,
           p.category_id, c.title AS category_title, c.slug AS category_slug,
           c.is_published AS category_is_published,
           p.location_id, l.name AS location_name,
           l.is_published AS location_is_published,
           (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.post_id) AS comment_count,
           (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.post_id) AS likes_count,
           EXISTS (
               SELECT 1 FROM post_likes pl
               WHERE pl.post_id = p.post_id AND pl.user_id = $1
           ) AS liked
    FROM posts p
    JOIN users u ON u.user_id = p.author_id
    LEFT JOIN categories c ON c.category_id = p.category_id
    LEFT JOIN locations l ON l.location_id = p.location_id
";

const FROM_SQL: &str = "
    FROM posts p
    JOIN users u ON u.user_id = p.author_id
    LEFT JOIN categories c ON c.category_id = p.category_id
    LEFT JOIN locations l ON l.location_id = p.location_id
";

/// Same rule as `Post::is_publicly_visible`, in SQL.
const VISIBLE_SQL: &str = "p.pub_date <= NOW() AND p.is_published AND c.is_published IS TRUE";

/// Private function to get Post entity from Row
fn row_to_post(row: &Row) -> Post {
    let category = row
        .get::<_, Option<i64>>("category_id")
        .map(|category_id| CategoryRef {
            category_id,
            title: row.get("category_title"),
            slug: row.get("category_slug"),
            is_published: row.get("category_is_published"),
        });
    let location = row
        .get::<_, Option<i64>>("location_id")
        .map(|location_id| LocationRef {
            location_id,
            name: row.get("location_name"),
            is_published: row.get("location_is_published"),
        });

    Post {
        post_id: row.get("post_id"),
        title: row.get("title"),
        text: row.get("text"),
        image: row.get("image"),
        pub_date: row.get("pub_date"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        category,
        location,
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
        comment_count: row.get("comment_count"),
        likes_count: row.get("likes_count"),
        liked: row.get("liked"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    Category(i64),
    Author(i64),
}

/// What a listing shows: a scope, optionally narrowed to public posts.
#[derive(Debug, Clone, Copy)]
pub struct PostFilter {
    pub scope: PostScope,
    pub visible_only: bool,
}

impl PostFilter {
    pub fn public(scope: PostScope) -> Self {
        Self {
            scope,
            visible_only: true,
        }
    }

    pub fn everything(scope: PostScope) -> Self {
        Self {
            scope,
            visible_only: false,
        }
    }

    /// WHERE clause plus its single optional parameter, numbered from `first`.
    fn where_clause(&self, first: usize) -> (String, Option<i64>) {
        let mut clauses = Vec::new();
        let param = match self.scope {
            PostScope::All => None,
            PostScope::Category(id) => {
                clauses.push(format!("p.category_id = ${}", first));
                Some(id)
            }
            PostScope::Author(id) => {
                clauses.push(format!("p.author_id = ${}", first));
                Some(id)
            }
        };
        if self.visible_only {
            clauses.push(VISIBLE_SQL.to_string());
        }
        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        (sql, param)
    }
}

pub async fn count_posts(filter: PostFilter, conn: &mut LazyConn) -> Result<i64, DbError> {
    let db = conn.get_client().await?;
    let (where_sql, param) = filter.where_clause(1);
    let sql = format!("SELECT COUNT(*) AS n {} {}", FROM_SQL, where_sql);

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(ref id) = param {
        params.push(id);
    }
    let row = db.query_one(sql.as_str(), &params).await?;
    Ok(row.get("n"))
}

/// One page of posts, newest publication date first.
pub async fn list_posts(
    filter: PostFilter,
    window: &PageWindow,
    viewer: Option<i64>,
    conn: &mut LazyConn,
) -> Result<Vec<Post>, DbError> {
    let db = conn.get_client().await?;
    let (where_sql, param) = filter.where_clause(4);
    let sql = format!(
        "{} {} ORDER BY p.pub_date DESC, p.post_id DESC LIMIT $2 OFFSET $3",
        POST_SQL, where_sql
    );

    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&viewer, &window.limit, &window.offset];
    if let Some(ref id) = param {
        params.push(id);
    }
    let rows = db.query(sql.as_str(), &params).await?;
    Ok(rows.iter().map(row_to_post).collect())
}

/// Single post regardless of visibility; callers decide who may see it.
pub async fn get_post(
    post_id: i64,
    viewer: Option<i64>,
    conn: &mut LazyConn,
) -> Result<Option<Post>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("{} WHERE p.post_id = $2", POST_SQL);
    let row = db.query_opt(sql.as_str(), &[&viewer, &post_id]).await?;
    Ok(row.as_ref().map(row_to_post))
}

/// Author and visibility data of a post, read inside a transaction.
pub async fn get_post_tx(
    post_id: i64,
    viewer: Option<i64>,
    tx: &mut Transaction<'_>,
) -> Result<Option<Post>, DbError> {
    let sql = format!("{} WHERE p.post_id = $2", POST_SQL);
    let row = tx.query_opt(sql.as_str(), &[&viewer, &post_id]).await?;
    Ok(row.as_ref().map(row_to_post))
}

/// Editable fields of a post
#[derive(Debug, Clone)]
pub struct PostData {
    pub title: String,
    pub text: String,
    pub image: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub location_id: Option<i64>,
    pub category_id: Option<i64>,
    pub is_published: bool,
}

pub async fn create_post(
    author_id: i64,
    data: &PostData,
    tx: &mut Transaction<'_>,
) -> Result<i64, DbError> {
    let post_id = generate_id();
    tx.execute(
        "
        INSERT INTO posts (post_id, title, text, image, pub_date, author_id,
                           location_id, category_id, is_published)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
        &[
            &post_id,
            &data.title,
            &data.text,
            &data.image,
            &data.pub_date,
            &author_id,
            &data.location_id,
            &data.category_id,
            &data.is_published,
        ],
    )
    .await?;
    Ok(post_id)
}

pub async fn update_post(
    post_id: i64,
    data: &PostData,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let updated = tx
        .execute(
            "
            UPDATE posts
            SET title = $2, text = $3, image = $4, pub_date = $5,
                location_id = $6, category_id = $7, is_published = $8
            WHERE post_id = $1
            ",
            &[
                &post_id,
                &data.title,
                &data.text,
                &data.image,
                &data.pub_date,
                &data.location_id,
                &data.category_id,
                &data.is_published,
            ],
        )
        .await?;
    Ok(updated > 0)
}

pub async fn delete_post(post_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    Ok(tx
        .execute("DELETE FROM posts WHERE post_id = $1", &[&post_id])
        .await?
        > 0)
}

/// Admin listing query; `search` matches prefixes case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct AdminPostQuery {
    pub search: Option<String>,
    pub is_published: Option<bool>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub author_id: Option<i64>,
}

/// `LIKE` pattern matching strings that start with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

impl AdminPostQuery {
    fn where_clause<'a>(
        &'a self,
        pattern: &'a Option<String>,
        params: &mut Vec<&'a (dyn ToSql + Sync)>,
    ) -> String {
        let mut clauses = Vec::new();

        if let Some(pattern) = pattern {
            params.push(pattern);
            let n = params.len();
            clauses.push(format!(
                "(p.title ILIKE ${n} OR c.title ILIKE ${n} OR l.name ILIKE ${n} OR u.username ILIKE ${n})"
            ));
        }
        if let Some(ref flag) = self.is_published {
            params.push(flag);
            clauses.push(format!("p.is_published = ${}", params.len()));
        }
        if let Some(ref id) = self.category_id {
            params.push(id);
            clauses.push(format!("p.category_id = ${}", params.len()));
        }
        if let Some(ref id) = self.location_id {
            params.push(id);
            clauses.push(format!("p.location_id = ${}", params.len()));
        }
        if let Some(ref id) = self.author_id {
            params.push(id);
            clauses.push(format!("p.author_id = ${}", params.len()));
        }

        if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        }
    }
}

pub async fn list_admin_posts(
    query: &AdminPostQuery,
    raw_page: Option<&str>,
    per_page: u32,
    conn: &mut LazyConn,
) -> Result<(Vec<Post>, PageWindow), DbError> {
    let db = conn.get_client().await?;
    let pattern = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(prefix_pattern);

    let mut count_params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    let where_sql = query.where_clause(&pattern, &mut count_params);
    let count_sql = format!("SELECT COUNT(*) AS n {} {}", FROM_SQL, where_sql);
    let total: i64 = db.query_one(count_sql.as_str(), &count_params).await?.get("n");

    let window = crate::utils::pagination::paginate(total, per_page, raw_page);

    let viewer: Option<i64> = None;
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&viewer];
    let where_sql = query.where_clause(&pattern, &mut params);
    params.push(&window.limit);
    let limit_n = params.len();
    params.push(&window.offset);
    let offset_n = params.len();

    let sql = format!(
        "{} {} ORDER BY p.pub_date DESC, p.post_id DESC LIMIT ${} OFFSET ${}",
        POST_SQL, where_sql, limit_n, offset_n
    );
    let rows = db.query(sql.as_str(), &params).await?;
    Ok((rows.iter().map(row_to_post).collect(), window))
}

/// Inline moderation from the admin list.
pub async fn moderate_post(
    post_id: i64,
    is_published: bool,
    category_id: Option<i64>,
    location_id: Option<i64>,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let updated = tx
        .execute(
            "
            UPDATE posts
            SET is_published = $2, category_id = $3, location_id = $4
            WHERE post_id = $1
            ",
            &[&post_id, &is_published, &category_id, &location_id],
        )
        .await?;
    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_filter_adds_visibility_rule() {
        let (sql, param) = PostFilter::public(PostScope::Category(5)).where_clause(4);
        assert_eq!(param, Some(5));
        assert!(sql.starts_with("WHERE p.category_id = $4 AND "));
        assert!(sql.contains(VISIBLE_SQL));
    }

    #[test]
    fn owner_listing_has_no_visibility_rule() {
        let (sql, param) = PostFilter::everything(PostScope::Author(9)).where_clause(1);
        assert_eq!(sql, "WHERE p.author_id = $1");
        assert_eq!(param, Some(9));

        let (sql, param) = PostFilter::everything(PostScope::All).where_clause(1);
        assert_eq!(sql, "");
        assert_eq!(param, None);
    }

    #[test]
    fn prefix_pattern_escapes_wildcards() {
        assert_eq!(prefix_pattern("tra"), "tra%");
        assert_eq!(prefix_pattern("50%_off"), "50\\%\\_off%");
    }

    #[test]
    fn admin_where_numbers_params_in_order() {
        let query = AdminPostQuery {
            search: Some("x".to_string()),
            is_published: Some(false),
            author_id: Some(3),
            ..Default::default()
        };
        let pattern = Some(prefix_pattern("x"));
        let viewer: Option<i64> = None;
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&viewer];
        let sql = query.where_clause(&pattern, &mut params);
        assert_eq!(params.len(), 4);
        assert!(sql.contains("p.title ILIKE $2"));
        assert!(sql.contains("p.is_published = $3"));
        assert!(sql.contains("p.author_id = $4"));
    }
}
