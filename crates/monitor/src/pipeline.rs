use std::sync::Arc;

use charger_monitor_connect::{FetchError, StationSource};
use charger_monitor_domain::{
    model::{StationId, Transaction},
    services::cache::PublishedCache,
    sink::{HistorySink, PublishResult, StatsSink, StatusSink},
};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("state refresh for station {station_id} failed for {failed} of 2 requests")]
    StateRefresh { station_id: StationId, failed: usize },
    #[error("failed to list transactions for station {station_id}: {source}")]
    Listing {
        station_id: StationId,
        #[source]
        source: FetchError,
    },
}

/// The three sinks a monitor publishes into.
#[derive(Clone)]
pub struct PublisherSet {
    pub stats: Arc<dyn StatsSink>,
    pub status: Arc<dyn StatusSink>,
    pub history: Arc<dyn HistorySink>,
}

impl PublisherSet {
    pub fn new(
        stats: Arc<dyn StatsSink>,
        status: Arc<dyn StatusSink>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            stats,
            status,
            history,
        }
    }

    /// Closes every sink, logging failures instead of stopping at the first.
    pub async fn close(&self) {
        if let Err(err) = self.stats.close().await {
            warn!(error = %err, "failed to close stats sink");
        }
        if let Err(err) = self.status.close().await {
            warn!(error = %err, "failed to close status sink");
        }
        if let Err(err) = self.history.close().await {
            warn!(error = %err, "failed to close history sink");
        }
    }
}

/// Decides whether a transaction's history is already stored.
///
/// A transaction without a stop time is never considered published. For final
/// transactions the history sink decides, and positive answers are cached so
/// later runs skip the lookup.
pub struct DedupGate {
    sink: Arc<dyn HistorySink>,
    cache: PublishedCache,
}

impl DedupGate {
    pub fn new(sink: Arc<dyn HistorySink>) -> Self {
        Self::with_cache(sink, PublishedCache::default())
    }

    pub fn with_cache(sink: Arc<dyn HistorySink>, cache: PublishedCache) -> Self {
        Self { sink, cache }
    }

    pub async fn is_published(&self, transaction: &Transaction) -> bool {
        if !transaction.is_final() {
            return false;
        }
        if self.cache.contains(&transaction.id) {
            return true;
        }
        let published = self.sink.is_published(transaction).await;
        if published {
            self.cache.remember(transaction);
        }
        published
    }

    pub async fn publish(
        &self,
        station_id: &StationId,
        transaction: &Transaction,
    ) -> PublishResult<()> {
        self.sink.publish(station_id, transaction).await?;
        self.cache.remember(transaction);
        Ok(())
    }
}

/// Outcome of one history run for a station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub seen: usize,
    pub skipped: usize,
    pub published: usize,
    pub failed: usize,
    /// False when pagination stopped early and only part of the list was seen.
    pub listing_complete: bool,
}

/// Job bodies shared by every station.
pub struct StationPipeline {
    source: Arc<dyn StationSource>,
    publishers: PublisherSet,
    gate: DedupGate,
}

impl StationPipeline {
    pub fn new(source: Arc<dyn StationSource>, publishers: PublisherSet) -> Self {
        let gate = DedupGate::new(Arc::clone(&publishers.history));
        Self::with_gate(source, publishers, gate)
    }

    pub fn with_gate(
        source: Arc<dyn StationSource>,
        publishers: PublisherSet,
        gate: DedupGate,
    ) -> Self {
        Self {
            source,
            publishers,
            gate,
        }
    }

    pub fn source(&self) -> &Arc<dyn StationSource> {
        &self.source
    }

    pub fn publishers(&self) -> &PublisherSet {
        &self.publishers
    }

    /// Refreshes the station snapshot and the transaction statistics. A failure
    /// in one does not skip the other.
    pub async fn refresh_state(&self, station_id: &StationId) -> Result<(), JobError> {
        let mut failed = 0;

        match self.source.get_station(station_id).await {
            Ok(station) => self.publishers.status.publish_station_status(&station).await,
            Err(err) => {
                warn!(station_id = %station_id, error = %err, "failed to fetch station");
                failed += 1;
            }
        }

        match self.source.get_transaction_stats(station_id).await {
            Ok(stats) => {
                debug!(
                    station_id = %station_id,
                    sessions = stats.sessions,
                    "fetched transaction stats"
                );
                self.publishers
                    .stats
                    .publish_transaction_stats(station_id, &stats)
                    .await
            }
            Err(err) => {
                warn!(station_id = %station_id, error = %err, "failed to fetch transaction stats");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(JobError::StateRefresh {
                station_id: station_id.clone(),
                failed,
            });
        }
        Ok(())
    }

    /// Publishes every transaction the history sink does not hold yet. Errors on
    /// single transactions are logged and left for the next run.
    pub async fn publish_history(&self, station_id: &StationId) -> Result<HistoryReport, JobError> {
        let mut report = HistoryReport {
            listing_complete: true,
            ..Default::default()
        };

        let transactions = match self.source.list_all_transactions(station_id).await {
            Ok(transactions) => transactions,
            Err(err) => {
                let (fetched, source) = err.into_parts();
                if fetched.is_empty() {
                    return Err(JobError::Listing {
                        station_id: station_id.clone(),
                        source,
                    });
                }
                warn!(
                    station_id = %station_id,
                    fetched = fetched.len(),
                    error = %source,
                    "transaction listing stopped early, processing partial list"
                );
                report.listing_complete = false;
                fetched
            }
        };

        for summary in &transactions {
            report.seen += 1;
            if self.gate.is_published(summary).await {
                debug!(transaction_id = %summary.id, "transaction already published");
                record(&mut report.skipped, "skipped");
                continue;
            }

            // Listings omit meter values, so the full record is fetched before publishing.
            let transaction = match self.source.get_transaction(&summary.id).await {
                Ok(transaction) => transaction,
                Err(err) => {
                    warn!(
                        transaction_id = %summary.id,
                        error = %err,
                        "failed to fetch transaction"
                    );
                    record(&mut report.failed, "fetch_failed");
                    continue;
                }
            };

            match self.gate.publish(station_id, &transaction).await {
                Ok(()) => {
                    debug!(
                        transaction_id = %transaction.id,
                        is_final = transaction.is_final(),
                        "published transaction history"
                    );
                    record(&mut report.published, "published");
                }
                Err(err) => {
                    warn!(
                        transaction_id = %transaction.id,
                        error = %err,
                        "failed to publish transaction history"
                    );
                    record(&mut report.failed, "publish_failed");
                }
            }
        }

        info!(
            station_id = %station_id,
            seen = report.seen,
            skipped = report.skipped,
            published = report.published,
            failed = report.failed,
            "transaction history run finished"
        );
        Ok(report)
    }
}

fn record(slot: &mut usize, result: &'static str) {
    *slot += 1;
    counter!("monitor_history_transactions_total", "result" => result).increment(1);
}
