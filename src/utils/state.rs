use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use fred::clients::Client as RedisClient;
use fred::prelude::{self, ClientLike};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::info;

use crate::utils::snowflake::MAX_SERVER_ID;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("${0} missing")]
    Missing(&'static str),

    #[error("${key} has a wrong value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub sessions_url: String,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    host: String,
    user: String,
    database: String,
    connections: u32,
    password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub secret_key: String,
    pub url: String,
    pub server_id: u8,
    pub media_url: String,
    pub session_ttl_secs: u64,
    pub posts_per_page: u32,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            secret_key: required("SECRET_KEY")?,
            url: optional("URL", "127.0.0.1:8000".to_string())?,
            server_id: optional("SERVER_ID", 0u8)?,
            media_url: optional("MEDIA_URL", "/media".to_string())?,
            session_ttl_secs: optional("SESSION_TTL_SECS", 14 * 24 * 3600u64)?,
            posts_per_page: optional("POSTS_PER_PAGE", 10u32)?,
            secure_cookies: optional("SECURE_COOKIES", false)?,
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.secret_key.len() < 16 {
            return Err(ConfigError::Invalid {
                key: "SECRET_KEY",
                reason: "must be at least 16 characters".to_string(),
            });
        }
        if self.server_id > MAX_SERVER_ID {
            return Err(ConfigError::Invalid {
                key: "SERVER_ID",
                reason: format!("exceeds max {}", MAX_SERVER_ID),
            });
        }
        if self.posts_per_page == 0 {
            return Err(ConfigError::Invalid {
                key: "POSTS_PER_PAGE",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl RedisConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            sessions_url: required("SESSIONS_REDIS_URL")?,
        })
    }
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: required("POSTGRES_HOST")?,
            user: required("POSTGRES_USER")?,
            database: required("POSTGRES_DATABASE")?,
            password: required("POSTGRES_PASSWORD")?,
            connections: optional("POSTGRES_CONNECTIONS", 16u32)?,
        })
    }

    pub fn create_pool(&self) -> Result<Pool, deadpool_postgres::BuildError> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.host);
        pg_config.user(&self.user);
        pg_config.password(&self.password);
        pg_config.dbname(&self.database);

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        Pool::builder(mgr).max_size(self.connections as usize).build()
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub db_pool: Arc<Pool>,
    pub config: Arc<Config>,
    pub sessions_redis: Arc<RedisClient>,
}

#[derive(Error, Debug)]
pub enum AppStateError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::BuildError),

    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),
}

impl AppState {
    pub async fn create_from_env() -> Result<AppState, AppStateError> {
        let config = Config::from_env()?;
        let postgres_config = PostgresConfig::from_env()?;
        let redis_config = RedisConfig::from_env()?;

        let db_pool = postgres_config.create_pool()?;

        let sessions_redis_config = prelude::Config::from_url(&redis_config.sessions_url)?;
        let sessions_redis = prelude::Builder::from_config(sessions_redis_config).build()?;
        sessions_redis.init().await?;
        info!("Connected to sessions redis");

        Ok(AppState {
            db_pool: Arc::new(db_pool),
            config: Arc::new(config),
            sessions_redis: Arc::new(sessions_redis),
        })
    }
}

pub type ArcAppState = Arc<AppState>;

#[cfg(test)]
impl AppState {
    /// State whose pool and redis client never connect unless used.
    pub(crate) fn for_tests() -> ArcAppState {
        let mgr = Manager::from_config(
            PgConfig::new(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let db_pool = Pool::builder(mgr).max_size(1).build().unwrap();
        let sessions_redis = prelude::Builder::default_centralized().build().unwrap();
        Arc::new(AppState {
            db_pool: Arc::new(db_pool),
            config: Arc::new(Config {
                secret_key: "0123456789abcdef".to_string(),
                url: "127.0.0.1:0".to_string(),
                server_id: 0,
                media_url: "/media".to_string(),
                session_ttl_secs: 60,
                posts_per_page: 10,
                secure_cookies: false,
            }),
            sessions_redis: Arc::new(sessions_redis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            secret_key: "0123456789abcdef".to_string(),
            url: "127.0.0.1:8000".to_string(),
            server_id: 0,
            media_url: "/media".to_string(),
            session_ttl_secs: 60,
            posts_per_page: 10,
            secure_cookies: false,
        }
    }

    #[test]
    fn accepts_sane_config() {
        assert!(config().check().is_ok());
    }

    #[test]
    fn rejects_short_secret_and_large_server_id() {
        let mut c = config();
        c.secret_key = "short".to_string();
        assert!(matches!(
            c.check(),
            Err(ConfigError::Invalid { key: "SECRET_KEY", .. })
        ));

        let mut c = config();
        c.server_id = 32;
        assert!(matches!(
            c.check(),
            Err(ConfigError::Invalid { key: "SERVER_ID", .. })
        ));
    }

    #[test]
    fn error_names_the_variable() {
        assert_eq!(
            ConfigError::Missing("SECRET_KEY").to_string(),
            "$SECRET_KEY missing"
        );
    }
}
