use deadpool_postgres::Transaction;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

use crate::{
    database::conn::{DbError, LazyConn},
    entities::user::{AuthUser, User},
    utils::snowflake::generate_id,
};

/// Private function for converting Row to User
fn row_to_user(row: &Row) -> User {
    User {
        user_id: row.get("user_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        role_id: row.get("role_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_auth_user(row: &Row) -> AuthUser {
    AuthUser {
        user_id: row.get("user_id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role_id: row.get("role_id"),
    }
}

const USER_COLUMNS: &str = "user_id, username, first_name, last_name, email, role_id, created_at";

async fn get_user_by(
    conn: &mut LazyConn,
    query_param: &(dyn ToSql + Sync),
    where_clause: &str,
) -> Result<Option<User>, DbError> {
    let db = conn.get_client().await?;
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, where_clause);
    let row = db.query_opt(&sql, &[query_param]).await?;
    Ok(row.as_ref().map(row_to_user))
}

pub async fn get_user(user_id: i64, conn: &mut LazyConn) -> Result<Option<User>, DbError> {
    get_user_by(conn, &user_id, "user_id = $1").await
}

pub async fn get_user_by_username(
    username: &str,
    conn: &mut LazyConn,
) -> Result<Option<User>, DbError> {
    get_user_by(conn, &username, "username = $1").await
}

pub async fn get_auth_user(
    username: &str,
    conn: &mut LazyConn,
) -> Result<Option<AuthUser>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt(
            "SELECT user_id, username, password_hash, role_id FROM users WHERE username = $1",
            &[&username],
        )
        .await?;
    Ok(row.as_ref().map(row_to_auth_user))
}

pub async fn get_password_hash(
    user_id: i64,
    conn: &mut LazyConn,
) -> Result<Option<String>, DbError> {
    let db = conn.get_client().await?;
    let row = db
        .query_opt("SELECT password_hash FROM users WHERE user_id = $1", &[&user_id])
        .await?;
    Ok(row.map(|r| r.get("password_hash")))
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

/// Fails with a unique violation on `users_username_key` for taken names.
pub async fn create_user(new: NewUser<'_>, tx: &mut Transaction<'_>) -> Result<i64, DbError> {
    let user_id = generate_id();
    tx.execute(
        "
        INSERT INTO users (user_id, username, email, password_hash)
        VALUES ($1, $2, $3, $4)
        ",
        &[&user_id, &new.username, &new.email, &new.password_hash],
    )
    .await?;
    Ok(user_id)
}

#[derive(Default, Debug)]
pub struct UserProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Updates the given profile fields, returns false when nothing was set
pub async fn update_user_profile(
    user_id: i64,
    update: UserProfileUpdate,
    tx: &mut Transaction<'_>,
) -> Result<bool, DbError> {
    let mut set_clauses = Vec::new();
    let mut values: Vec<&(dyn ToSql + Sync)> = Vec::new();

    if let Some(ref username) = update.username {
        values.push(username);
        set_clauses.push(format!("username = ${}", values.len() + 1));
    }
    if let Some(ref first_name) = update.first_name {
        values.push(first_name);
        set_clauses.push(format!("first_name = ${}", values.len() + 1));
    }
    if let Some(ref last_name) = update.last_name {
        values.push(last_name);
        set_clauses.push(format!("last_name = ${}", values.len() + 1));
    }
    if let Some(ref email) = update.email {
        values.push(email);
        set_clauses.push(format!("email = ${}", values.len() + 1));
    }

    if set_clauses.is_empty() {
        return Ok(false);
    }

    let query = format!(
        "UPDATE users SET {} WHERE user_id = $1",
        set_clauses.join(", ")
    );

    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&user_id];
    params.extend(values);

    Ok(tx.execute(query.as_str(), &params).await? > 0)
}

pub async fn set_password_hash(
    user_id: i64,
    password_hash: &str,
    tx: &mut Transaction<'_>,
) -> Result<(), DbError> {
    tx.execute(
        "UPDATE users SET password_hash = $2 WHERE user_id = $1",
        &[&user_id, &password_hash],
    )
    .await?;
    Ok(())
}

/// `(user_id, username)` of everyone who wrote at least one post.
pub async fn list_authors(conn: &mut LazyConn) -> Result<Vec<(i64, String)>, DbError> {
    let db = conn.get_client().await?;
    let rows = db
        .query(
            "
            SELECT DISTINCT u.user_id, u.username
            FROM users u
            JOIN posts p ON p.author_id = u.user_id
            ORDER BY u.username
            ",
            &[],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get("user_id"), r.get("username")))
        .collect())
}

pub async fn count_users(conn: &mut LazyConn) -> Result<i64, DbError> {
    let db = conn.get_client().await?;
    let row = db.query_one("SELECT COUNT(*) AS n FROM users", &[]).await?;
    Ok(row.get("n"))
}
