use std::sync::Arc;

use deadpool_postgres::{Object, Pool, PoolError, Transaction};
use thiserror::Error;
use tracing::error;

use crate::utils::response::AppError;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("query error: {0}")]
    Query(#[from] tokio_postgres::Error),
}

impl DbError {
    /// Unique constraint that rejected the statement, if any.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            DbError::Query(err) => err
                .as_db_error()
                .filter(|db| *db.code() == tokio_postgres::error::SqlState::UNIQUE_VIOLATION)
                .and_then(|db| db.constraint()),
            DbError::Pool(_) => None,
        }
    }
}

// App errors (pages)
impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        error!("Database error: {:?}", err);
        AppError::Internal
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        DbError::Pool(err).into()
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        DbError::Query(err).into()
    }
}

/// Pool connection taken on first use and held for the rest of the request.
pub struct LazyConn {
    pool: Arc<Pool>,
    client: Option<Object>,
}

impl LazyConn {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool, client: None }
    }

    pub async fn get_client(&mut self) -> Result<&mut Object, PoolError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => self.pool.get().await?,
        };
        Ok(self.client.insert(client))
    }

    pub async fn transaction(&mut self) -> Result<Transaction<'_>, DbError> {
        let client = self.get_client().await?;
        Ok(client.transaction().await?)
    }
}
