use sea_orm::sea_query::{ColumnDef, Index, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{meter_values, transactions};
use crate::errors::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let transactions_table = Table::create()
        .table(transactions::Entity)
        .col(
            ColumnDef::new(transactions::Column::Id)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(transactions::Column::Station)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::ConnectorId)
                .big_integer()
                .not_null(),
        )
        .col(ColumnDef::new(transactions::Column::StartAt).timestamp_with_time_zone().null())
        .col(ColumnDef::new(transactions::Column::StopAt).timestamp_with_time_zone().null())
        .col(ColumnDef::new(transactions::Column::Duration).double().not_null())
        .col(ColumnDef::new(transactions::Column::Energy).big_integer().not_null())
        .col(ColumnDef::new(transactions::Column::Status).big_integer().not_null())
        .col(ColumnDef::new(transactions::Column::Power).big_integer().not_null())
        .col(
            ColumnDef::new(transactions::Column::Currency)
                .string_len(16)
                .not_null(),
        )
        .col(ColumnDef::new(transactions::Column::PriceKw).double().not_null())
        .col(ColumnDef::new(transactions::Column::PriceTotal).double().not_null())
        .col(ColumnDef::new(transactions::Column::MeterStart).big_integer().not_null())
        .col(ColumnDef::new(transactions::Column::MeterStop).big_integer().not_null())
        .col(ColumnDef::new(transactions::Column::StopReason).string().not_null())
        .col(ColumnDef::new(transactions::Column::AverageCurrent).double().not_null())
        .col(ColumnDef::new(transactions::Column::ChargingDuration).double().not_null())
        .to_owned();
    create_table(db, backend, transactions_table).await?;

    let meter_values_table = Table::create()
        .table(meter_values::Entity)
        .col(
            ColumnDef::new(meter_values::Column::Date)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(meter_values::Column::TransactionId)
                .string_len(64)
                .not_null(),
        )
        .col(ColumnDef::new(meter_values::Column::CurrentImport).double().not_null())
        .col(ColumnDef::new(meter_values::Column::CurrentOffered).double().not_null())
        .col(
            ColumnDef::new(meter_values::Column::EnergyActiveImportRegister)
                .big_integer()
                .not_null(),
        )
        .col(ColumnDef::new(meter_values::Column::PowerActiveImport).double().not_null())
        .col(ColumnDef::new(meter_values::Column::Soc).big_integer().not_null())
        .col(ColumnDef::new(meter_values::Column::Temperature).double().not_null())
        .col(ColumnDef::new(meter_values::Column::Voltage).double().not_null())
        .primary_key(
            Index::create()
                .col(meter_values::Column::Date)
                .col(meter_values::Column::TransactionId),
        )
        .to_owned();
    create_table(db, backend, meter_values_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
