use charger_monitor_domain::sink::PublishError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StorageError> for PublishError {
    fn from(err: StorageError) -> Self {
        PublishError::Sink(err.to_string())
    }
}
