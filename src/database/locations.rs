use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::{
    database::{
        conn::{DbError, LazyConn},
        posts::prefix_pattern,
    },
    entities::location::Location,
    utils::snowflake::generate_id,
};

fn row_to_location(row: &Row) -> Location {
    Location {
        location_id: row.get("location_id"),
        name: row.get("name"),
        is_published: row.get("is_published"),
        created_at: row.get("created_at"),
    }
}

const LOCATION_SQL: &str = "SELECT location_id, name, is_published, created_at FROM locations";

pub async fn get_location(
    location_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<Location>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("{} WHERE location_id = $1", LOCATION_SQL);
    let row = db.query_opt(sql.as_str(), &[&location_id]).await?;
    Ok(row.as_ref().map(row_to_location))
}

pub async fn list_locations(
    search: Option<&str>,
    is_published: Option<bool>,
    conn: &mut LazyConn,
) -> Result<Vec<Location>, DbError> {
    let db = conn.get_client().await?;
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(prefix_pattern);

    let mut clauses = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(ref p) = pattern {
        params.push(p);
        clauses.push(format!("name ILIKE ${}", params.len()));
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

    let sql = format!("{} {} ORDER BY name", LOCATION_SQL, where_sql);
    let rows = db.query(sql.as_str(), &params).await?;
    Ok(rows.iter().map(row_to_location).collect())
}

pub async fn create_location(
    name: &str,
    is_published: bool,
    tx: &mut Transaction<'_>,
) -> Result<i64, DbError> {
    let location_id = generate_id();
    tx.execute(
        "INSERT INTO locations (location_id, name, is_published) VALUES ($1, $2, $3)",
        &[&location_id, &name, &is_published],
    )
    .await?;
    Ok(location_id)
}

pub async fn update_location(
    location_id: i64,
    name: &str,
    is_published: bool,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    Ok(tx
        .execute(
            "UPDATE locations SET name = $2, is_published = $3 WHERE location_id = $1",
            &[&location_id, &name, &is_published],
        )
        .await?
        > 0)
}

pub async fn delete_location(location_id: i64, tx: &mut Transaction<'_>) -> Result<bool, DbError> {
    Ok(tx
        .execute("DELETE FROM locations WHERE location_id = $1", &[&location_id])
        .await?
        > 0)
}
