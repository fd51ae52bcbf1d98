use async_trait::async_trait;
use thiserror::Error;

use crate::model::{SeriesError, Station, StationId, Transaction, TransactionId, TransactionStats};

/// Common result alias for sink operations.
pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("sink write failed: {0}")]
    Sink(String),
    #[error("transaction {transaction_id} has an invalid meter series: {source}")]
    InvalidSeries {
        transaction_id: TransactionId,
        #[source]
        source: SeriesError,
    },
}

impl PublishError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Sink(err.to_string())
    }
}

/// Receives the per-station aggregate snapshot. Writes overwrite, never accumulate.
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn publish_transaction_stats(&self, station_id: &StationId, stats: &TransactionStats);

    async fn close(&self) -> PublishResult<()> {
        Ok(())
    }
}

/// Receives the latest station snapshot.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_station_status(&self, station: &Station);

    async fn close(&self) -> PublishResult<()> {
        Ok(())
    }
}

/// Durable store for finished charging sessions.
///
/// `publish` must be idempotent: the transaction upserts by its ID and meter rows
/// upsert by `(timestamp, transaction ID)`, so redelivery never duplicates data.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Whether the transaction's final history is already stored. Must return
    /// `false` for a transaction without a stop time.
    async fn is_published(&self, transaction: &Transaction) -> bool;

    async fn publish(&self, station_id: &StationId, transaction: &Transaction)
        -> PublishResult<()>;

    async fn close(&self) -> PublishResult<()> {
        Ok(())
    }
}
