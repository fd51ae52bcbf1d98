use async_trait::async_trait;
use charger_monitor_domain::{
    model::{Station, StationId, TransactionStats},
    sink::{StatsSink, StatusSink},
};
use chrono::Utc;
use metrics::{describe_gauge, gauge, Unit};

pub const DEFAULT_PREFIX: &str = "charger_station";

/// Station gauges written through the `metrics` facade.
///
/// The publisher holds no registry of its own. Whatever recorder the process
/// installed receives the values, so exposition stays with the telemetry setup.
#[derive(Debug, Clone)]
pub struct PrometheusPublisher {
    prefix: String,
}

impl PrometheusPublisher {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let publisher = Self {
            prefix: prefix.into(),
        };
        publisher.describe();
        publisher
    }

    fn name(&self, metric: &str) -> String {
        format!("{}_{}", self.prefix, metric)
    }

    fn describe(&self) {
        describe_gauge!(
            self.name("last_poll_timestamp_seconds"),
            Unit::Seconds,
            "When the station was last polled"
        );
        describe_gauge!(self.name("sessions_total"), "Number of charging sessions");
        describe_gauge!(self.name("total_energy"), "Energy delivered over all sessions");
        describe_gauge!(self.name("average_energy"), "Average energy delivered per session");
        describe_gauge!(
            self.name("total_duration_seconds"),
            Unit::Seconds,
            "Duration of all charging sessions"
        );
        describe_gauge!(
            self.name("top_session_duration_seconds"),
            Unit::Seconds,
            "Longest charging session"
        );
        describe_gauge!(self.name("energy_price_per_kwh"), "Configured price of energy");
        describe_gauge!(
            self.name("available_power_kw"),
            "Power currently available to the connector"
        );
        describe_gauge!(self.name("max_power_kw"), "Maximum power of the connector");
    }

    pub fn record_station_status(&self, station: &Station) {
        let station_id = station.id.to_string();
        gauge!(self.name("last_poll_timestamp_seconds"), "station_id" => station_id.clone())
            .set(Utc::now().timestamp() as f64);
        gauge!(self.name("energy_price_per_kwh"), "station_id" => station_id.clone())
            .set(station.price_kw);

        for connector in &station.connectors {
            let labels = [
                ("station_id", station_id.clone()),
                ("connector", connector.id.to_string()),
            ];
            gauge!(self.name("available_power_kw"), &labels).set(connector.power);
            gauge!(self.name("max_power_kw"), &labels).set(connector.max_power);
        }
    }

    pub fn record_transaction_stats(&self, station_id: &StationId, stats: &TransactionStats) {
        let station_id = station_id.to_string();
        gauge!(self.name("sessions_total"), "station_id" => station_id.clone())
            .set(stats.sessions as f64);
        gauge!(self.name("total_energy"), "station_id" => station_id.clone())
            .set(stats.total_energy as f64);
        gauge!(self.name("average_energy"), "station_id" => station_id.clone())
            .set(stats.average_energy);
        gauge!(self.name("total_duration_seconds"), "station_id" => station_id.clone())
            .set(stats.duration as f64);
        gauge!(self.name("top_session_duration_seconds"), "station_id" => station_id)
            .set(stats.top_session as f64);
    }
}

impl Default for PrometheusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatsSink for PrometheusPublisher {
    async fn publish_transaction_stats(&self, station_id: &StationId, stats: &TransactionStats) {
        self.record_transaction_stats(station_id, stats);
    }
}

#[async_trait]
impl StatusSink for PrometheusPublisher {
    async fn publish_station_status(&self, station: &Station) {
        self.record_station_status(station);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charger_monitor_domain::model::Connector;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn gauge_value(rendered: &str, name: &str, label: &str) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .find(|line| line.starts_with(&format!("{name}{{")) && line.contains(label))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn stats_overwrite_station_gauges() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let publisher = PrometheusPublisher::new();
        let station = StationId::from("station-1");

        metrics::with_local_recorder(&recorder, || {
            publisher.record_transaction_stats(
                &station,
                &TransactionStats {
                    total_energy: 30_000,
                    sessions: 2,
                    average_energy: 15_000.0,
                    ..Default::default()
                },
            );
            publisher.record_transaction_stats(
                &station,
                &TransactionStats {
                    total_energy: 42_000,
                    sessions: 3,
                    average_energy: 14_000.0,
                    duration: 7_200,
                    top_session: 3_600,
                    currency: "CAD".to_string(),
                },
            );
        });

        let rendered = handle.render();
        let label = r#"station_id="station-1""#;
        assert_eq!(gauge_value(&rendered, "charger_station_total_energy", label), Some(42_000.0));
        assert_eq!(gauge_value(&rendered, "charger_station_average_energy", label), Some(14_000.0));
        assert_eq!(gauge_value(&rendered, "charger_station_sessions_total", label), Some(3.0));
        assert_eq!(
            gauge_value(&rendered, "charger_station_top_session_duration_seconds", label),
            Some(3_600.0)
        );
    }

    #[test]
    fn status_sets_connector_gauges() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let publisher = PrometheusPublisher::with_prefix("grizzl_e_station");
        let station = Station {
            id: StationId::from("station-1"),
            price_kw: 0.12,
            connectors: vec![
                Connector {
                    id: 1,
                    power: 7.2,
                    max_power: 9.6,
                    ..Default::default()
                },
                Connector {
                    id: 2,
                    power: 0.0,
                    max_power: 9.6,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        metrics::with_local_recorder(&recorder, || publisher.record_station_status(&station));

        let rendered = handle.render();
        assert_eq!(
            gauge_value(&rendered, "grizzl_e_station_available_power_kw", r#"connector="1""#),
            Some(7.2)
        );
        assert_eq!(
            gauge_value(&rendered, "grizzl_e_station_max_power_kw", r#"connector="2""#),
            Some(9.6)
        );
        assert_eq!(
            gauge_value(
                &rendered,
                "grizzl_e_station_energy_price_per_kwh",
                r#"station_id="station-1""#
            ),
            Some(0.12)
        );
        let polled = gauge_value(
            &rendered,
            "grizzl_e_station_last_poll_timestamp_seconds",
            r#"station_id="station-1""#,
        )
        .expect("poll timestamp recorded");
        assert!(polled > 0.0);
    }
}
