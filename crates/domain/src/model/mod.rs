//! Station and transaction data as reported by the Connect API.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Identifier the remote system assigns to a charging station.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for StationId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique, immutable identifier of one charging session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connector {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub power: f64,
    pub max_power: f64,
    pub error_code: String,
}

/// Snapshot of a station. Every poll replaces the previous value wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Station {
    pub id: StationId,
    pub identity: String,
    pub serial_number: String,
    pub online: bool,
    pub mode: String,
    pub status: String,
    pub error_code: String,
    pub connectors: Vec<Connector>,
    pub currency: String,
    #[serde(rename = "priceKW")]
    pub price_kw: f64,
}

/// Aggregates recomputed by the remote system on every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionStats {
    pub total_energy: i64,
    pub sessions: i64,
    pub average_energy: f64,
    pub duration: i64,
    pub top_session: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: TransactionId,
    pub user: String,
    pub station: StationId,
    pub id_tag: String,
    pub connector_id: i64,
    #[serde(deserialize_with = "blank_timestamp_as_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "blank_timestamp_as_none")]
    pub stop_at: Option<DateTime<Utc>>,
    pub duration: f64,
    pub energy: i64,
    pub status: i64,
    pub power: i64,
    pub currency: String,
    #[serde(rename = "priceKW")]
    pub price_kw: f64,
    pub price_total: f64,
    pub meter_start: i64,
    pub meter_stop: i64,
    pub stop_reason: String,
    pub average_current: f64,
    pub charging_duration: f64,
    pub meter_values: MeterValueSeries,
}

impl Transaction {
    /// A transaction is final once the remote system has recorded its stop time.
    pub fn is_final(&self) -> bool {
        self.stop_at.is_some()
    }
}

/// Index-aligned samples: position `i` of every vector describes one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeterValueSeries {
    pub date: Vec<DateTime<Utc>>,
    pub current_import: Vec<f64>,
    pub current_offered: Vec<f64>,
    pub energy_active_import_register: Vec<i64>,
    pub power_active_import: Vec<f64>,
    #[serde(rename = "SoC")]
    pub soc: Vec<i64>,
    pub temperature: Vec<f64>,
    pub voltage: Vec<f64>,
}

/// One row of a [`MeterValueSeries`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSample {
    pub at: DateTime<Utc>,
    pub current_import: f64,
    pub current_offered: f64,
    pub energy_active_import_register: i64,
    pub power_active_import: f64,
    pub soc: i64,
    pub temperature: f64,
    pub voltage: f64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeriesError {
    #[error("meter series `{field}` has {actual} samples, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl MeterValueSeries {
    pub fn len(&self) -> usize {
        self.date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }

    /// Checks that every sequence has as many entries as `date`.
    pub fn validate(&self) -> Result<(), SeriesError> {
        let expected = self.date.len();
        let lengths = [
            ("currentImport", self.current_import.len()),
            ("currentOffered", self.current_offered.len()),
            (
                "energyActiveImportRegister",
                self.energy_active_import_register.len(),
            ),
            ("powerActiveImport", self.power_active_import.len()),
            ("SoC", self.soc.len()),
            ("temperature", self.temperature.len()),
            ("voltage", self.voltage.len()),
        ];

        for (field, actual) in lengths {
            if actual != expected {
                return Err(SeriesError::LengthMismatch {
                    field,
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }

    /// Yields one [`MeterSample`] per instant after validating alignment.
    pub fn samples(&self) -> Result<impl Iterator<Item = MeterSample> + '_, SeriesError> {
        self.validate()?;
        Ok((0..self.len()).map(move |index| MeterSample {
            at: self.date[index],
            current_import: self.current_import[index],
            current_offered: self.current_offered[index],
            energy_active_import_register: self.energy_active_import_register[index],
            power_active_import: self.power_active_import[index],
            soc: self.soc[index],
            temperature: self.temperature[index],
            voltage: self.voltage[index],
        }))
    }
}

// The API sends "" for timestamps that are not set yet.
fn blank_timestamp_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}
