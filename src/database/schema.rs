use deadpool_postgres::Pool;
use tracing::info;

use crate::database::conn::DbError;

const SCHEMA: &str = include_str!("../../resources/schema.sql");

/// Creates missing tables and indexes; safe to run on every start.
pub async fn migrate(pool: &Pool) -> Result<(), DbError> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    info!("Database schema is up to date");
    Ok(())
}
