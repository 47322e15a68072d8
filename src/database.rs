use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use tracing::debug;

use crate::Error;

/// A pooled database session.
pub type Session = PoolConnection<Postgres>;

/// A table owned by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model {
    /// The name of the table.
    pub table: &'static str,
    /// Idempotent DDL that creates the table, i.e. `CREATE TABLE IF NOT EXISTS ...`.
    pub schema: &'static str,
}

/// Storage backend for plugin tables.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Creates the table described by `model` unless it already exists.
    async fn create_table(&self, model: &Model) -> Result<(), Error>;

    /// Returns a new session.
    async fn session(&self) -> Result<Session, Error>;
}

/// Database connection pool.
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Wraps an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Acquires a new session from the pool.
    ///
    /// Each call returns its own session which is returned to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabasePool`] if no connection could be acquired.
    pub async fn session(&self) -> Result<Session, Error> {
        self.pool.acquire().await.map_err(Error::DatabasePool)
    }
}

#[async_trait]
impl Storage for Database {
    async fn create_table(&self, model: &Model) -> Result<(), Error> {
        debug!(table = model.table, "creating table");

        sqlx::query(model.schema)
            .execute(&self.pool)
            .await
            .map_err(|source| Error::CreateTable {
                table: model.table,
                source,
            })?;

        Ok(())
    }

    async fn session(&self) -> Result<Session, Error> {
        Database::session(self).await
    }
}

/// Connects to the database using the provided url and configuration.
///
/// # Errors
///
/// If unable to establish connection to the database, `Err(Error::OpenDatabase)` is returned.
pub async fn connect(config: &crate::config::DbConfig) -> Result<Database, Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .idle_timeout(config.idle_timeout)
        .connect(&config.url)
        .await
        .map_err(Error::OpenDatabase)?;

    Ok(Database::new(pool))
}
