//! SeaORM-backed history sink for finished charging sessions. SQLite is the
//! default backend; PostgreSQL (including TimescaleDB) is available via the
//! `postgres` feature.

mod builder;
mod entity;
mod errors;
mod history_store;
mod migration;

use std::sync::Arc;

pub use builder::StorageBuilder;
pub use errors::{StorageError, StorageResult};
use sea_orm::DatabaseConnection;

/// Shared storage handle used by the monitor.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Closes the connection pool shared by every clone of this handle. Later
    /// queries fail.
    pub async fn close(&self) -> StorageResult<()> {
        self.connection()
            .clone()
            .close()
            .await
            .map_err(StorageError::from_source)
    }
}
