use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::{
    database::{
        conn::{DbError, LazyConn},
        posts::prefix_pattern,
    },
    entities::category::Category,
    utils::snowflake::generate_id,
};

fn row_to_category(row: &Row) -> Category {
    Category {
        category_id: row.get("category_id"),
        title: row.get("title"),
        description: row.get("description"),
        slug: row.get("slug"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

const CATEGORY_SQL: &str =
    "SELECT category_id, title, description, slug, is_published, created_at FROM categories";

/// Published category by slug; unpublished ones are treated as missing.
pub async fn get_published_category(
    slug: &str,
    conn: &mut LazyConn,
) -> Result<Option<Category>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("{} WHERE slug = $1 AND is_published", CATEGORY_SQL);
    let row = db.query_opt(sql.as_str(), &[&slug]).await?;
    Ok(row.as_ref().map(row_to_category))
}

pub async fn get_category(
    category_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<Category>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("{} WHERE category_id = $1", CATEGORY_SQL);
    let row = db.query_opt(sql.as_str(), &[&category_id]).await?;
    Ok(row.as_ref().map(row_to_category))
}

/// Every category by title; the admin search narrows by title or slug prefix.
pub async fn list_categories(
    search: Option<&str>,
    is_published: Option<bool>,
    conn: &mut LazyConn,
) -> Result<Vec<Category>, DbError> {
    let db = conn.get_client().await?;
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(prefix_pattern);

    let mut clauses = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(ref p) = pattern {
        params.push(p);
        clauses.push(format!(
            "(title ILIKE ${n} OR slug ILIKE ${n})",
            n = params.len()
        ));
    }
    if let Some(ref flag) = is_published {
        params.push(flag);
        clauses.push(format!("is_published = ${}", params.len()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!("{} {} ORDER BY title", CATEGORY_SQL, where_sql);
    let rows = db.query(sql.as_str(), &params).await?;
    Ok(rows.iter().map(row_to_category).collect())
}

#[derive(Debug, Clone)]
pub struct CategoryData {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
}

/// Fails with a unique violation on `categories_slug_key` for taken slugs.
pub async fn create_category(
    data: &CategoryData,
    tx: &mut Transaction<'_>,
) -> Result<i64, DbError> {
    let category_id = generate_id();
    tx.execute(
        "
        INSERT INTO categories (category_id, title, description, slug, is_published)
        VALUES ($1, $2, $3, $4, $5)
        ",
        &[
            &category_id,
            &data.title,
            &data.description,
            &data.slug,
            &data.is_published,
        ],
    )
    .await?;
    Ok(category_id)
}

pub async fn update_category(
    category_id: i64,
    data: &CategoryData,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    Ok(tx
        .execute(
            "
            UPDATE categories
            SET title = $2, description = $3, slug = $4, is_published = $5
            WHERE category_id = $1
            ",
            &[
                &category_id,
                &data.title,
                &data.description,
                &data.slug,
                &data.is_published,
            ],
        )
        .await?
        > 0)
}

/// Posts of a deleted category lose their category (`ON DELETE SET NULL`).
pub async fn delete_category(category_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    Ok(tx
        .execute("DELETE FROM categories WHERE category_id = $1", &[&category_id])
        .await?
        > 0)
}
