pub mod transactions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "transactions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub station: String,
        pub connector_id: i64,
        pub start_at: Option<DateTimeUtc>,
        pub stop_at: Option<DateTimeUtc>,
        pub duration: f64,
        pub energy: i64,
        pub status: i64,
        pub power: i64,
        pub currency: String,
        pub price_kw: f64,
        pub price_total: f64,
        pub meter_start: i64,
        pub meter_stop: i64,
        pub stop_reason: String,
        pub average_current: f64,
        pub charging_duration: f64,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod meter_values {
    use sea_orm::entity::prelude::*;

    /// One meter sample, keyed by `(date, transaction_id)`.
    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "meter_values")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub date: DateTimeUtc,
        #[sea_orm(primary_key, auto_increment = false)]
        pub transaction_id: String,
        pub current_import: f64,
        pub current_offered: f64,
        pub energy_active_import_register: i64,
        pub power_active_import: f64,
        pub soc: i64,
        pub temperature: f64,
        pub voltage: f64,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
