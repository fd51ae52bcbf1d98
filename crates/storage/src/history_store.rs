use std::collections::BTreeMap;

use charger_monitor_domain::{
    model::{MeterSample, StationId, Transaction},
    sink::{HistorySink, PublishError, PublishResult},
};
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{debug, warn};

use crate::entity::{meter_values, transactions};
use crate::errors::StorageError;
use crate::SeaOrmStorage;

/// Rows per multi-row insert. Keeps bound parameters under SQLite's limit.
const METER_CHUNK: usize = 100;

#[async_trait::async_trait]
impl HistorySink for SeaOrmStorage {
    async fn is_published(&self, transaction: &Transaction) -> bool {
        if !transaction.is_final() {
            return false;
        }

        let stored = transactions::Entity::find()
            .filter(transactions::Column::Id.eq(transaction.id.as_str()))
            .filter(transactions::Column::StopAt.is_not_null())
            .count(self.connection())
            .await;
        match stored {
            Ok(count) => count > 0,
            Err(err) => {
                warn!(
                    transaction = %transaction.id,
                    error = %err,
                    "failed to look up published transaction"
                );
                false
            }
        }
    }

    async fn publish(
        &self,
        station_id: &StationId,
        transaction: &Transaction,
    ) -> PublishResult<()> {
        let samples = transaction
            .meter_values
            .samples()
            .map_err(|source| PublishError::InvalidSeries {
                transaction_id: transaction.id.clone(),
                source,
            })?;
        // Repeated timestamps collapse to the last sample so one statement never
        // touches the same key twice.
        let by_date: BTreeMap<_, MeterSample> =
            samples.map(|sample| (sample.at, sample)).collect();
        let meter_rows: Vec<meter_values::ActiveModel> = by_date
            .into_values()
            .map(|sample| meter_row(transaction, sample))
            .collect();

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        transactions::Entity::insert(transaction_row(station_id, transaction))
            .on_conflict(
                OnConflict::column(transactions::Column::Id)
                    .update_columns([
                        transactions::Column::Station,
                        transactions::Column::ConnectorId,
                        transactions::Column::StartAt,
                        transactions::Column::StopAt,
                        transactions::Column::Duration,
                        transactions::Column::Energy,
                        transactions::Column::Status,
                        transactions::Column::Power,
                        transactions::Column::Currency,
                        transactions::Column::PriceKw,
                        transactions::Column::PriceTotal,
                        transactions::Column::MeterStart,
                        transactions::Column::MeterStop,
                        transactions::Column::StopReason,
                        transactions::Column::AverageCurrent,
                        transactions::Column::ChargingDuration,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(StorageError::from_source)?;

        let written = meter_rows.len();
        let mut rows = meter_rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<_> = rows.by_ref().take(METER_CHUNK).collect();
            meter_values::Entity::insert_many(chunk)
                .on_conflict(
                    OnConflict::columns([
                        meter_values::Column::Date,
                        meter_values::Column::TransactionId,
                    ])
                    .update_columns([
                        meter_values::Column::CurrentImport,
                        meter_values::Column::CurrentOffered,
                        meter_values::Column::EnergyActiveImportRegister,
                        meter_values::Column::PowerActiveImport,
                        meter_values::Column::Soc,
                        meter_values::Column::Temperature,
                        meter_values::Column::Voltage,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await
                .map_err(StorageError::from_source)?;
        }

        txn.commit().await.map_err(StorageError::from_source)?;
        debug!(
            station = %station_id,
            transaction = %transaction.id,
            meter_values = written,
            "stored transaction history"
        );
        Ok(())
    }

    async fn close(&self) -> PublishResult<()> {
        SeaOrmStorage::close(self).await?;
        debug!("history store closed");
        Ok(())
    }
}

fn transaction_row(
    station_id: &StationId,
    transaction: &Transaction,
) -> transactions::ActiveModel {
    let station = if transaction.station.as_str().is_empty() {
        station_id.as_str()
    } else {
        transaction.station.as_str()
    };

    transactions::ActiveModel {
        id: Set(transaction.id.as_str().to_string()),
        station: Set(station.to_string()),
        connector_id: Set(transaction.connector_id),
        start_at: Set(transaction.start_at),
        stop_at: Set(transaction.stop_at),
        duration: Set(transaction.duration),
        energy: Set(transaction.energy),
        status: Set(transaction.status),
        power: Set(transaction.power),
        currency: Set(transaction.currency.clone()),
        price_kw: Set(transaction.price_kw),
        price_total: Set(transaction.price_total),
        meter_start: Set(transaction.meter_start),
        meter_stop: Set(transaction.meter_stop),
        stop_reason: Set(transaction.stop_reason.clone()),
        average_current: Set(transaction.average_current),
        charging_duration: Set(transaction.charging_duration),
    }
}

fn meter_row(transaction: &Transaction, sample: MeterSample) -> meter_values::ActiveModel {
    meter_values::ActiveModel {
        date: Set(sample.at),
        transaction_id: Set(transaction.id.as_str().to_string()),
        current_import: Set(sample.current_import),
        current_offered: Set(sample.current_offered),
        energy_active_import_register: Set(sample.energy_active_import_register),
        power_active_import: Set(sample.power_active_import),
        soc: Set(sample.soc),
        temperature: Set(sample.temperature),
        voltage: Set(sample.voltage),
    }
}
