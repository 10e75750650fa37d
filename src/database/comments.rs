use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::{
    database::{
        conn::{DbError, LazyConn},
        posts::prefix_pattern,
    },
    entities::comment::{Comment, ModeratedComment},
    utils::{
        pagination::{PageWindow, paginate},
        snowflake::generate_id,
    },
};

const COMMENT_SQL: &str = "
    SELECT cm.comment_id, cm.post_id, cm.author_id, u.username AS author_username,
           cm.text, cm.is_published, cm.created_at
    FROM comments cm
    JOIN users u ON u.user_id = cm.author_id
";

fn row_to_comment(row: &Row) -> Comment {
    Comment {
        comment_id: row.get("comment_id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        text: row.get("text"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

/// Comments of a post, oldest first
pub async fn list_comments(post_id: i64, conn: &mut LazyConn) -> Result<Vec<Comment>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!(
        "{} WHERE cm.post_id = $1 ORDER BY cm.created_at, cm.comment_id",
        COMMENT_SQL
    );
    let rows = db.query(sql.as_str(), &[&post_id]).await?;
    Ok(rows.iter().map(row_to_comment).collect())
}

/// A comment, but only when it belongs to `post_id`.
pub async fn get_comment(
    post_id: i64,
    comment_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<Comment>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("{} WHERE cm.comment_id = $1 AND cm.post_id = $2", COMMENT_SQL);
    let row = db.query_opt(sql.as_str(), &[&comment_id, &post_id]).await?;
    Ok(row.as_ref().map(row_to_comment))
}

pub async fn create_comment(
    post_id: i64,
    author_id: i64,
    text: &str,
    tx: &mut Transaction<'_>,
) -> Result<i64, DbError> {
    let comment_id = generate_id();
    tx.execute(
        "
        INSERT INTO comments (comment_id, post_id, author_id, text)
        VALUES ($1, $2, $3, $4)
        ",
        &[&comment_id, &post_id, &author_id, &text],
    )
    .await?;
    Ok(comment_id)
}

pub async fn update_comment(
    comment_id: i64,
    text: &str,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    Ok(tx
        .execute(
            "UPDATE comments SET text = $2 WHERE comment_id = $1",
            &[&comment_id, &text],
        )
        .await?
        > 0)
}

pub async fn delete_comment(comment_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    Ok(tx
        .execute("DELETE FROM comments WHERE comment_id = $1", &[&comment_id])
        .await?
        > 0)
}

/// Admin listing, newest first, optionally narrowed to authors whose
/// username starts with `author_prefix`.
pub async fn list_moderated_comments(
    author_prefix: Option<&str>,
    raw_page: Option<&str>,
    per_page: u32,
    conn: &mut LazyConn,
) -> Result<(Vec<ModeratedComment>, PageWindow), DbError> {
    let db = conn.get_client().await?;
    let pattern = author_prefix
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(prefix_pattern);

    let where_sql = if pattern.is_some() {
        "WHERE u.username ILIKE $1"
    } else {
        ""
    };
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(ref p) = pattern {
        params.push(p);
    }

    let count_sql = format!(
        "SELECT COUNT(*) AS n FROM comments cm JOIN users u ON u.user_id = cm.author_id {}",
        where_sql
    );
    let total: i64 = db.query_one(count_sql.as_str(), &params).await?.get("n");
    let window = paginate(total, per_page, raw_page);

    params.push(&window.limit);
    let limit_n = params.len();
    params.push(&window.offset);
    let offset_n = params.len();

    let sql = format!(
        "
        SELECT cm.comment_id, cm.post_id, cm.author_id, u.username AS author_username,
               cm.text, cm.is_published, cm.created_at, p.title AS post_title
        FROM comments cm
        JOIN users u ON u.user_id = cm.author_id
        JOIN posts p ON p.post_id = cm.post_id
        {}
        ORDER BY cm.created_at DESC
        LIMIT ${} OFFSET ${}
        ",
        where_sql, limit_n, offset_n
    );
    let rows = db.query(sql.as_str(), &params).await?;
    let comments = rows
        .iter()
        .map(|row| ModeratedComment {
            comment: row_to_comment(row),
            post_title: row.get("post_title"),
        })
        .collect();
    Ok((comments, window))
}

pub async fn count_comments(conn: &mut LazyConn) -> Result<i64, DbError> {
    let db = conn.get_client().await?;
    let row = db.query_one("SELECT COUNT(*) AS n FROM comments", &[]).await?;
    Ok(row.get("n"))
}
