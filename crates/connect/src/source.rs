use async_trait::async_trait;
use charger_monitor_domain::{
    config::MonitorConfig,
    model::{Station, StationId, Transaction, TransactionId, TransactionStats},
};
use tracing::debug;

use crate::{
    error::{FetchError, PaginationError},
    session::SessionClient,
    types::{GetStationsResponse, GetTransactionResponse, GetTransactionsResponse},
};

/// Read access to chargers and their charging history.
#[async_trait]
pub trait StationSource: Send + Sync {
    /// Number of transactions requested per page by
    /// [`StationSource::list_all_transactions`].
    fn page_size(&self) -> usize;

    async fn list_stations(&self) -> Result<Vec<Station>, FetchError>;
    async fn get_station(&self, id: &StationId) -> Result<Station, FetchError>;
    async fn get_transaction_stats(
        &self,
        station_id: &StationId,
    ) -> Result<TransactionStats, FetchError>;
    /// Fetches one page. `offset` counts pages, not transactions.
    async fn list_transactions(
        &self,
        station_id: &StationId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>, FetchError>;
    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, FetchError>;

    /// Walks pages until one comes back shorter than the page size. On failure
    /// the pages already received travel with the error.
    async fn list_all_transactions(
        &self,
        station_id: &StationId,
    ) -> Result<Vec<Transaction>, PaginationError> {
        let page_size = self.page_size().max(1);
        let mut transactions = Vec::new();
        let mut offset = 0;

        loop {
            let page = match self.list_transactions(station_id, page_size, offset).await {
                Ok(page) => page,
                Err(source) => {
                    return Err(PaginationError {
                        fetched: transactions,
                        source,
                    })
                }
            };
            let exhausted = page.len() < page_size;
            transactions.extend(page);
            if exhausted {
                debug!(
                    station = %station_id,
                    pages = offset + 1,
                    total = transactions.len(),
                    "listed transactions"
                );
                return Ok(transactions);
            }
            offset += 1;
        }
    }
}

/// [`StationSource`] backed by the Connect cloud API.
#[derive(Debug)]
pub struct ConnectClient {
    session: SessionClient,
    page_size: usize,
}

impl ConnectClient {
    pub fn new(session: SessionClient, page_size: usize) -> Self {
        Self {
            session,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, FetchError> {
        Ok(Self::new(
            SessionClient::from_config(config)?,
            config.page_size(),
        ))
    }

    pub fn session(&self) -> &SessionClient {
        &self.session
    }
}

#[async_trait]
impl StationSource for ConnectClient {
    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn list_stations(&self) -> Result<Vec<Station>, FetchError> {
        let response: GetStationsResponse = self
            .session
            .get_json("/client/stations", &[("includeShared", "true".to_string())])
            .await?;
        Ok(response.stations)
    }

    async fn get_station(&self, id: &StationId) -> Result<Station, FetchError> {
        self.session
            .get_json(&format!("/client/stations/{id}"), &[])
            .await
    }

    async fn get_transaction_stats(
        &self,
        station_id: &StationId,
    ) -> Result<TransactionStats, FetchError> {
        self.session
            .get_json(
                "/client/transactions/statistics",
                &[("stationId", station_id.to_string())],
            )
            .await
    }

    async fn list_transactions(
        &self,
        station_id: &StationId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>, FetchError> {
        let response: GetTransactionsResponse = self
            .session
            .get_json(
                "/client/transactions",
                &[
                    ("stationId", station_id.to_string()),
                    ("limit", limit.to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;
        Ok(response.transactions)
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction, FetchError> {
        let response: GetTransactionResponse = self
            .session
            .get_json(&format!("/client/transactions/{id}"), &[])
            .await?;
        Ok(response.transaction)
    }
}
