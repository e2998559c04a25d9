//! Reporting composer
//!
//! Every reporting tick the composer reads each enabled pipeline, derives the
//! secondary quantities, updates the gauges and the shared state. On report
//! ticks the snapshot is also handed to every configured sink.
//!
//! Rain since the last report is drained from the rainmeter on every tick and
//! held here until all sinks have accepted it, so a failed upload carries its
//! rain forward into the next one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::anemometer::Anemometer;
use crate::atmosphere::Atmosphere;
use crate::config::ReportingConfig;
use crate::error::Result;
use crate::metrics::{self, MetricsSink};
use crate::physics::{
    celsius_to_fahrenheit, dew_point_celsius, hpa_to_inhg, round_to, sea_level_pressure,
};
use crate::rainmeter::Rainmeter;
use crate::state::StateHandle;

/// One composed observation. Fields are `None` when their pipeline is
/// disabled or its sensor could not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub sea_level_pressure_hpa: Option<f64>,
    pub sea_level_pressure_inhg: Option<f64>,
    pub dew_point_c: Option<f64>,
    pub dew_point_f: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub wind_gust_mph: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_direction_name: Option<String>,
    pub rain_rate_mm_per_hour: Option<f64>,
    pub rain_last_minute_mm: Option<f64>,
    pub rain_since_report_mm: Option<f64>,
    pub rain_day_mm: Option<f64>,
    pub rain_hourly_peak_mm: Option<f64>,
}

impl Snapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature_c: None,
            temperature_f: None,
            humidity_percent: None,
            pressure_hpa: None,
            sea_level_pressure_hpa: None,
            sea_level_pressure_inhg: None,
            dew_point_c: None,
            dew_point_f: None,
            wind_speed_mph: None,
            wind_gust_mph: None,
            wind_direction_deg: None,
            wind_direction_name: None,
            rain_rate_mm_per_hour: None,
            rain_last_minute_mm: None,
            rain_since_report_mm: None,
            rain_day_mm: None,
            rain_hourly_peak_mm: None,
        }
    }
}

/// Outcome of handing a snapshot to one sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub sink: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for composed snapshots
#[async_trait]
pub trait ReportSink: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn publish(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Tracks the rain day, which starts at a fixed UTC hour rather than midnight
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRollover {
    start_hour: u32,
    current: NaiveDate,
}

impl DailyRollover {
    pub fn new(start_hour: u32, now: DateTime<Utc>) -> Self {
        let start_hour = start_hour.min(23);
        Self {
            start_hour,
            current: rain_day(start_hour, now),
        }
    }

    pub fn current(&self) -> NaiveDate {
        self.current
    }

    /// True once when `now` has entered a new rain day
    pub fn due(&mut self, now: DateTime<Utc>) -> bool {
        let day = rain_day(self.start_hour, now);
        if day > self.current {
            self.current = day;
            return true;
        }
        false
    }
}

fn rain_day(start_hour: u32, now: DateTime<Utc>) -> NaiveDate {
    let date = now.date_naive();
    if now.hour() >= start_hour {
        date
    } else {
        date - ChronoDuration::days(1)
    }
}

pub struct Reporter {
    wind: Option<Arc<Anemometer>>,
    rain: Option<Arc<Rainmeter>>,
    atmosphere: Option<Arc<Atmosphere>>,
    altitude_m: f64,
    sinks: Vec<Arc<dyn ReportSink>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    state: StateHandle,
    tick: Duration,
    report_interval: Duration,
    pending_rain_mm: Mutex<f64>,
    rollover: Mutex<DailyRollover>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("wind", &self.wind.is_some())
            .field("rain", &self.rain.is_some())
            .field("atmosphere", &self.atmosphere.is_some())
            .field("sinks", &self.sinks)
            .field("tick", &self.tick)
            .field("report_interval", &self.report_interval)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    pub fn new(config: &ReportingConfig, state: StateHandle, now: DateTime<Utc>) -> Self {
        Self {
            wind: None,
            rain: None,
            atmosphere: None,
            altitude_m: 0.0,
            sinks: Vec::new(),
            metrics: None,
            state,
            tick: Duration::from_secs(config.tick_seconds.max(1)),
            report_interval: Duration::from_secs(config.report_interval_minutes.max(1) * 60),
            pending_rain_mm: Mutex::new(0.0),
            rollover: Mutex::new(DailyRollover::new(config.rain_day_start_hour_utc, now)),
        }
    }

    pub fn with_wind(mut self, wind: Arc<Anemometer>) -> Self {
        self.wind = Some(wind);
        self
    }

    pub fn with_rain(mut self, rain: Arc<Rainmeter>) -> Self {
        self.rain = Some(rain);
        self
    }

    /// Attach the atmosphere pipeline; `altitude_m` is used for the sea-level reduction
    pub fn with_atmosphere(mut self, atmosphere: Arc<Atmosphere>, altitude_m: f64) -> Self {
        self.atmosphere = Some(atmosphere);
        self.altitude_m = altitude_m;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    fn pending(&self) -> MutexGuard<'_, f64> {
        self.pending_rain_mm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Rain drained from the rainmeter but not yet accepted by every sink, in mm
    pub fn pending_rain_mm(&self) -> f64 {
        *self.pending()
    }

    /// Read every pipeline and build a snapshot
    pub async fn compose(&self, now: DateTime<Utc>) -> Snapshot {
        let mut snapshot = Snapshot::empty(now);

        if let Some(atmosphere) = &self.atmosphere {
            let temperature = atmosphere.temperature().await;
            let environment = atmosphere.read_humidity_and_pressure().await;

            snapshot.temperature_c = temperature;
            snapshot.temperature_f = temperature.map(celsius_to_fahrenheit);
            snapshot.humidity_percent = environment.map(|e| e.humidity_percent);
            snapshot.pressure_hpa = environment.map(|e| e.pressure_hpa);

            if let (Some(t), Some(env)) = (temperature, environment) {
                let sea_level = sea_level_pressure(env.pressure_hpa, t, self.altitude_m);
                snapshot.sea_level_pressure_hpa = Some(round_to(sea_level, 2));
                snapshot.sea_level_pressure_inhg = Some(hpa_to_inhg(sea_level));

                let dew_point = dew_point_celsius(t, env.humidity_percent);
                snapshot.dew_point_c = Some(dew_point);
                snapshot.dew_point_f = Some(celsius_to_fahrenheit(dew_point));
            }
        }

        if let Some(wind) = &self.wind {
            let direction = wind.direction();
            snapshot.wind_speed_mph = Some(wind.speed());
            snapshot.wind_gust_mph = Some(wind.gust());
            snapshot.wind_direction_deg = Some(direction);
            snapshot.wind_direction_name = Some(wind.direction_name().to_string());
        }

        if let Some(rain) = &self.rain {
            let since_report = {
                let mut pending = self.pending();
                *pending += rain.accumulation();
                *pending
            };
            snapshot.rain_rate_mm_per_hour = Some(rain.rate());
            snapshot.rain_last_minute_mm = Some(rain.minute_rate());
            snapshot.rain_since_report_mm = Some(since_report);
            snapshot.rain_day_mm = Some(rain.day_accumulation());
            snapshot.rain_hourly_peak_mm = rain.hourly_peak();
        }

        self.update_metrics(&snapshot);
        snapshot
    }

    fn update_metrics(&self, snapshot: &Snapshot) {
        let Some(sink) = &self.metrics else {
            return;
        };

        let gauges = [
            (
                metrics::ATMOSPHERIC_PRESSURE,
                "Station pressure in hPa",
                snapshot.pressure_hpa,
            ),
            (
                metrics::RELATIVE_HUMIDITY,
                "Relative humidity in percent",
                snapshot.humidity_percent,
            ),
            (
                metrics::TEMPERATURE,
                "Air temperature in degrees Celsius",
                snapshot.temperature_c,
            ),
            (
                metrics::RAIN_HOUR_RATE,
                "Rainfall rate in mm per hour",
                snapshot.rain_rate_mm_per_hour,
            ),
            (
                metrics::RAIN_DAY,
                "Rainfall since the start of the rain day in mm",
                snapshot.rain_day_mm,
            ),
            (metrics::WINDSPEED, "Mean wind speed in mph", snapshot.wind_speed_mph),
            (metrics::WINDGUST, "Wind gust in mph", snapshot.wind_gust_mph),
            (
                metrics::WINDDIRECTION,
                "Mean wind direction in degrees",
                snapshot.wind_direction_deg,
            ),
        ];

        for (name, help, value) in gauges {
            if let Some(value) = value {
                sink.set_gauge(name, help, value);
            }
        }
    }

    /// Hand `snapshot` to every sink. Returns true when all of them accepted it.
    ///
    /// Pending rain is only released once every sink has succeeded.
    pub async fn publish(&self, snapshot: &Snapshot) -> bool {
        let mut all_ok = true;

        for sink in &self.sinks {
            let result = sink.publish(snapshot).await;
            if let Err(e) = &result {
                warn!("Report to '{}' failed: {}", sink.name(), e);
                all_ok = false;
            } else {
                debug!("Report to '{}' accepted", sink.name());
            }

            let record = ReportRecord {
                sink: sink.name().to_string(),
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                timestamp: snapshot.timestamp,
            };
            self.state.write().await.add_record(record);
        }

        if all_ok {
            if let Some(sent) = snapshot.rain_since_report_mm {
                let mut pending = self.pending();
                *pending = (*pending - sent).max(0.0);
            }
        }
        all_ok
    }

    /// One reporting cycle: daily rollover, compose, and publish when `report_due`
    pub async fn tick(&self, now: DateTime<Utc>, report_due: bool) -> Snapshot {
        let new_day = self
            .rollover
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .due(now);
        if new_day {
            if let Some(rain) = &self.rain {
                info!(
                    "New rain day, resetting daily rain accumulation of {:.2} mm",
                    rain.day_accumulation()
                );
                rain.reset_day_accumulation();
            }
        }

        let snapshot = self.compose(now).await;
        self.state.write().await.set_latest(snapshot.clone());

        if report_due {
            info!("Publishing report to {} sink(s)", self.sinks.len());
            self.publish(&snapshot).await;
        }
        snapshot
    }

    /// Which report interval `now` falls in; reports go out when it changes
    fn report_slot(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp()
            .div_euclid(self.report_interval.as_secs().max(1) as i64)
    }

    /// Run reporting ticks until cancelled. Reports go out on wall-clock
    /// boundaries of the report interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_slot = self.report_slot(Utc::now());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let slot = self.report_slot(now);
                    let report_due = slot != last_slot;
                    last_slot = slot;
                    self.tick(now, report_due).await;
                }
                _ = cancel.cancelled() => {
                    debug!("Reporter cancelled");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StationError;
    use crate::metrics::GaugeRegistry;
    use crate::rainmeter::RainSettings;
    use crate::state::new_state_handle;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct TestSink {
        fail: AtomicBool,
        published: Mutex<Vec<Snapshot>>,
        calls: AtomicUsize,
    }

    impl TestSink {
        fn failing() -> Self {
            let sink = Self::default();
            sink.fail.store(true, Ordering::SeqCst);
            sink
        }
    }

    #[async_trait]
    impl ReportSink for TestSink {
        fn name(&self) -> &str {
            "test"
        }

        async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(StationError::Sink("upstream unavailable".to_string()));
            }
            self.published.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 12, hour, minute, 0).unwrap()
    }

    fn rain() -> Arc<Rainmeter> {
        Arc::new(Rainmeter::new(RainSettings::default(), None).unwrap())
    }

    const MM: f64 = 0.2794;

    #[test]
    fn rain_day_starts_at_configured_hour() {
        let mut rollover = DailyRollover::new(9, at(8, 59));
        assert_eq!(rollover.current(), NaiveDate::from_ymd_opt(2026, 5, 11).unwrap());

        assert!(!rollover.due(at(8, 59)));
        assert!(rollover.due(at(9, 0)));
        assert!(!rollover.due(at(9, 1)));
        assert!(!rollover.due(at(23, 59)));
        assert_eq!(rollover.current(), NaiveDate::from_ymd_opt(2026, 5, 12).unwrap());
    }

    #[tokio::test]
    async fn empty_reporter_composes_empty_snapshot() {
        let reporter = Reporter::new(&ReportingConfig::default(), new_state_handle(10), at(10, 0));
        let snapshot = reporter.compose(at(10, 0)).await;
        assert_eq!(snapshot, Snapshot::empty(at(10, 0)));
    }

    #[tokio::test]
    async fn failed_upload_carries_rain_forward() {
        let rain = rain();
        let sink = Arc::new(TestSink::failing());
        let state = new_state_handle(10);
        let reporter = Reporter::new(&ReportingConfig::default(), state.clone(), at(10, 0))
            .with_rain(rain.clone())
            .with_sink(sink.clone());

        rain.record_tip();
        rain.record_tip();
        let first = reporter.tick(at(10, 0), true).await;
        assert!((first.rain_since_report_mm.unwrap() - 2.0 * MM).abs() < 1e-12);

        rain.record_tip();
        sink.fail.store(false, Ordering::SeqCst);
        let second = reporter.tick(at(10, 10), true).await;
        assert!((second.rain_since_report_mm.unwrap() - 3.0 * MM).abs() < 1e-12);
        assert!(reporter.pending_rain_mm().abs() < 1e-12);

        let state = state.read().await;
        let history = &state.history;
        assert_eq!(history.len(), 2);
        assert!(!history[0].success);
        assert!(history[1].success);
    }

    #[tokio::test]
    async fn rain_between_reports_accumulates() {
        let rain = rain();
        let sink = Arc::new(TestSink::default());
        let reporter = Reporter::new(&ReportingConfig::default(), new_state_handle(10), at(10, 0))
            .with_rain(rain.clone())
            .with_sink(sink.clone());

        rain.record_tip();
        reporter.tick(at(10, 1), false).await;
        rain.record_tip();
        let snapshot = reporter.tick(at(10, 2), true).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!((snapshot.rain_since_report_mm.unwrap() - 2.0 * MM).abs() < 1e-12);

        let next = reporter.tick(at(10, 3), false).await;
        assert_eq!(next.rain_since_report_mm, Some(0.0));
    }

    #[tokio::test]
    async fn rollover_resets_day_accumulation() {
        let rain = rain();
        let reporter = Reporter::new(&ReportingConfig::default(), new_state_handle(10), at(8, 0))
            .with_rain(rain.clone());

        rain.record_tip();
        let before = reporter.tick(at(8, 59), false).await;
        assert!((before.rain_day_mm.unwrap() - MM).abs() < 1e-12);

        let after = reporter.tick(at(9, 0), false).await;
        assert_eq!(after.rain_day_mm, Some(0.0));
    }

    #[tokio::test]
    async fn latest_snapshot_and_gauges_are_updated() {
        let rain = rain();
        let state = new_state_handle(10);
        let gauges = Arc::new(GaugeRegistry::new());
        let reporter = Reporter::new(&ReportingConfig::default(), state.clone(), at(10, 0))
            .with_rain(rain.clone())
            .with_metrics(gauges.clone());

        rain.record_tip();
        rain.roll_tick();
        let snapshot = reporter.tick(at(10, 0), false).await;

        assert_eq!(state.read().await.latest.as_ref(), Some(&snapshot));
        assert!((gauges.get(metrics::RAIN_HOUR_RATE).unwrap() - MM).abs() < 1e-12);
        assert_eq!(gauges.get(metrics::TEMPERATURE), None);
    }

    #[tokio::test]
    async fn publish_without_sinks_releases_rain() {
        let rain = rain();
        let reporter = Reporter::new(&ReportingConfig::default(), new_state_handle(10), at(10, 0))
            .with_rain(rain.clone());

        rain.record_tip();
        let snapshot = reporter.compose(at(10, 0)).await;
        assert!(reporter.publish(&snapshot).await);
        assert_eq!(reporter.pending_rain_mm(), 0.0);
    }

    #[test]
    fn report_slots_follow_wall_clock() {
        let reporter = Reporter::new(&ReportingConfig::default(), new_state_handle(1), at(10, 0));
        assert_eq!(reporter.report_slot(at(10, 0)), reporter.report_slot(at(10, 9)));
        assert_ne!(reporter.report_slot(at(10, 9)), reporter.report_slot(at(10, 10)));
    }
}
