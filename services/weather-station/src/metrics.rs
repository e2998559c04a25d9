//! Telemetry gauges
//!
//! The reporter pushes every composed value through a [`MetricsSink`]; the
//! pipelines themselves never touch telemetry state.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use tracing::warn;

pub const ATMOSPHERIC_PRESSURE: &str = "atmospheric_pressure";
pub const RELATIVE_HUMIDITY: &str = "relative_humidity";
pub const TEMPERATURE: &str = "temperature";
pub const RAIN_HOUR_RATE: &str = "rain_hour_rate";
pub const RAIN_DAY: &str = "rain_day";
pub const WINDSPEED: &str = "windspeed";
pub const WINDGUST: &str = "windgust";
pub const WINDDIRECTION: &str = "winddirection";

/// Receives gauge updates
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, name: &str, help: &str, value: f64);
}

/// Prometheus gauges owned by the station rather than the process-wide
/// default registry.
///
/// A gauge is registered the first time it is set.
#[derive(Default)]
pub struct GaugeRegistry {
    registry: Registry,
    gauges: Mutex<HashMap<String, Gauge>>,
}

impl std::fmt::Debug for GaugeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("GaugeRegistry")
            .field("gauges", &gauges.len())
            .finish()
    }
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.gauges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Gauge::get)
    }

    /// Text exposition of every registered gauge
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn register(&self, name: &str, help: &str) -> prometheus::Result<Gauge> {
        let gauge = Gauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }
}

impl MetricsSink for GaugeRegistry {
    fn set_gauge(&self, name: &str, help: &str, value: f64) {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gauge) = gauges.get(name) {
            gauge.set(value);
            return;
        }

        match self.register(name, help) {
            Ok(gauge) => {
                gauge.set(value);
                gauges.insert(name.to_string(), gauge);
            }
            Err(e) => warn!("Cannot register gauge {}: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_value() {
        let registry = GaugeRegistry::new();
        assert_eq!(registry.get(WINDSPEED), None);

        registry.set_gauge(WINDSPEED, "Wind speed in mph", 3.5);
        registry.set_gauge(WINDSPEED, "Wind speed in mph", 4.0);
        assert_eq!(registry.get(WINDSPEED), Some(4.0));
    }

    #[test]
    fn render_text_format() {
        let registry = GaugeRegistry::new();
        registry.set_gauge(TEMPERATURE, "Temperature in C", 12.5);
        registry.set_gauge(RAIN_DAY, "Rain today in mm", 0.0);

        let text = registry.render();
        assert!(text.contains("# HELP rain_day Rain today in mm\n"));
        assert!(text.contains("# TYPE rain_day gauge\n"));
        assert!(text.contains("rain_day 0\n"));
        assert!(text.contains("# TYPE temperature gauge\n"));
        assert!(text.contains("temperature 12.5\n"));
        assert!(text.find("rain_day").unwrap() < text.find("temperature").unwrap());
    }

    #[test]
    fn invalid_name_is_skipped() {
        let registry = GaugeRegistry::new();
        registry.set_gauge("wind speed", "Not a valid metric name", 1.0);
        assert_eq!(registry.get("wind speed"), None);
        assert!(registry.render().is_empty());
    }
}
