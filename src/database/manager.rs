use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config;
use crate::filter::FilterError;

/// Reference schema, applied by `realty db init`.
pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Errors from the data gateway
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Invalid record in {collection}: {message}")]
    InvalidRecord { collection: String, message: String },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds the Postgres pool from configuration and applies the reference schema.
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect using `DATABASE_URL` (via config).
    pub async fn connect() -> Result<PgPool, DatabaseError> {
        let url = config::config()
            .database
            .url
            .clone()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        Self::connect_url(&url).await
    }

    pub async fn connect_url(database_url: &str) -> Result<PgPool, DatabaseError> {
        let connection_string = Self::build_connection_string(database_url)?;
        let db = &config::config().database;

        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(Duration::from_secs(db.connection_timeout))
            .connect(&connection_string)
            .await?;

        info!("Created database pool (max_connections={})", db.max_connections);
        Ok(pool)
    }

    fn build_connection_string(database_url: &str) -> Result<String, DatabaseError> {
        let url = url::Url::parse(database_url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match url.scheme() {
            "postgres" | "postgresql" => {}
            _ => return Err(DatabaseError::InvalidDatabaseUrl),
        }
        if url.path().trim_start_matches('/').is_empty() {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(url.into())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Apply `sql/schema.sql`. Statements are idempotent (`IF NOT EXISTS`).
    pub async fn apply_schema(pool: &PgPool) -> Result<(), DatabaseError> {
        // Plain-string execution goes over the simple query protocol, which allows
        // several statements in one round trip
        pool.execute(SCHEMA_SQL).await?;
        info!("Applied database schema");
        Ok(())
    }
}
