//! Report sink that writes each snapshot to the log

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::report::{ReportSink, Snapshot};

#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }

    /// One-line summary of the readings present in `snapshot`
    pub fn summary(snapshot: &Snapshot) -> String {
        let fields = [
            ("temp", snapshot.temperature_c, "°C"),
            ("rh", snapshot.humidity_percent, "%"),
            ("slp", snapshot.sea_level_pressure_hpa, "hPa"),
            ("dew", snapshot.dew_point_c, "°C"),
            ("wind", snapshot.wind_speed_mph, "mph"),
            ("gust", snapshot.wind_gust_mph, "mph"),
            ("dir", snapshot.wind_direction_deg, "°"),
            ("rain", snapshot.rain_rate_mm_per_hour, "mm/h"),
            ("day", snapshot.rain_day_mm, "mm"),
        ];

        let parts: Vec<String> = fields
            .iter()
            .filter_map(|(label, value, unit)| value.map(|v| format!("{}={:.2}{}", label, v, unit)))
            .collect();

        if parts.is_empty() {
            "no readings".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        info!(
            "Observation {}: {}",
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
            Self::summary(snapshot)
        );
        Ok(())
    }
}
