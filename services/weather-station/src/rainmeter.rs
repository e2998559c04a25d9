//! Rain pipeline
//!
//! Bucket tips arrive as debounced edges. Tips are counted three ways: since
//! the last tick (rolled into the tip buffer every tick), since the last report
//! (read-and-clear), and for the current rain day (cleared by the reporter).
//! The tip buffer covers one hour and rolls its hourly sum, minimum and maximum
//! into 24-slot tiers.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cascade::{CascadeBuilder, Statistic, TierId};
use crate::config::RainConfig;
use crate::error::Result;
use crate::io::EdgeSource;
use crate::led::Led;
use crate::stats::RingStatBuffer;

const SECONDS_PER_HOUR: f64 = 3600.0;
const EDGE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Calibration and buffer geometry for the rain pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RainSettings {
    pub mm_per_tip: f64,
    pub tick_seconds: u32,
    pub window_seconds: u32,
    pub rollup_slots: usize,
}

impl RainSettings {
    /// Tick length, never below one second
    fn tick(&self) -> u32 {
        self.tick_seconds.max(1)
    }

    fn tick_slots(&self) -> usize {
        (self.window_seconds / self.tick()).max(1) as usize
    }
}

impl Default for RainSettings {
    fn default() -> Self {
        Self::from(&RainConfig::default())
    }
}

impl From<&RainConfig> for RainSettings {
    fn from(config: &RainConfig) -> Self {
        Self {
            mm_per_tip: config.mm_per_tip,
            tick_seconds: config.tick_seconds.max(1),
            window_seconds: config.window_seconds,
            rollup_slots: config.rollup_slots,
        }
    }
}

#[derive(Debug, Default)]
struct RainCounters {
    rain_tip: u32,
    day_tips: u64,
    since_tips: u64,
}

#[derive(Debug)]
pub struct Rainmeter {
    settings: RainSettings,
    counters: Mutex<RainCounters>,
    tips: RingStatBuffer,
    hourly_totals: TierId,
    hourly_max: TierId,
    led: Option<Led>,
}

impl Rainmeter {
    pub fn new(settings: RainSettings, led: Option<Led>) -> Result<Self> {
        let mut builder = CascadeBuilder::new();
        let root = builder.tier("tips", settings.tick_slots());
        let hourly_totals = builder.tier("hourly_totals", settings.rollup_slots);
        let hourly_min = builder.tier("hourly_min", settings.rollup_slots);
        let hourly_max = builder.tier("hourly_max", settings.rollup_slots);
        builder
            .feed(root, Statistic::Sum, hourly_totals)
            .feed(root, Statistic::Minimum, hourly_min)
            .feed(root, Statistic::Maximum, hourly_max);

        let tips = RingStatBuffer::from_cascade(builder.build(root)?);
        // Tip counts start from a dry window rather than repeating the first tick.
        tips.fill(0.0);

        Ok(Self {
            settings,
            counters: Mutex::new(RainCounters::default()),
            tips,
            hourly_totals,
            hourly_max,
            led,
        })
    }

    pub fn settings(&self) -> &RainSettings {
        &self.settings
    }

    fn counters(&self) -> MutexGuard<'_, RainCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one bucket tip
    pub fn record_tip(&self) {
        let pending = {
            let mut counters = self.counters();
            counters.rain_tip += 1;
            counters.day_tips += 1;
            counters.since_tips += 1;
            counters.rain_tip
        };
        info!("Bucket tip ({} this tick)", pending);

        if let Some(led) = &self.led {
            led.flash();
        }
    }

    /// Move the tips counted since the last tick into the tip buffer
    pub fn roll_tick(&self) {
        let tips = std::mem::take(&mut self.counters().rain_tip);
        debug!("Rain tick: {} tips", tips);
        self.tips.add_item(tips as f64);
    }

    /// Rainfall rate over the tip buffer in mm/hr
    pub fn rate(&self) -> f64 {
        let span = self.tips.size() as f64 * self.settings.tick() as f64;
        let sum = self.tips.average_min_max_sum().sum;
        sum * self.settings.mm_per_tip * (SECONDS_PER_HOUR / span)
    }

    /// Rainfall over the last minute in mm
    pub fn minute_rate(&self) -> f64 {
        let slots = (60 / self.settings.tick()).max(1) as usize;
        self.tips.sum_min_max_last(slots).sum * self.settings.mm_per_tip
    }

    /// Rainfall since the previous call in mm; the counter is cleared
    pub fn accumulation(&self) -> f64 {
        let tips = std::mem::take(&mut self.counters().since_tips);
        tips as f64 * self.settings.mm_per_tip
    }

    /// Rainfall since the last day reset in mm
    pub fn day_accumulation(&self) -> f64 {
        self.counters().day_tips as f64 * self.settings.mm_per_tip
    }

    pub fn reset_day_accumulation(&self) {
        self.counters().day_tips = 0;
    }

    /// Wettest completed hour in the rollup window in mm, once an hour has completed
    pub fn hourly_peak(&self) -> Option<f64> {
        self.tips.tier_last(self.hourly_totals)?;
        self.tips
            .tier_stats(self.hourly_totals)
            .map(|stats| stats.maximum * self.settings.mm_per_tip)
    }

    /// Largest single-tick rainfall in the rollup window in mm
    pub fn peak_tick(&self) -> Option<f64> {
        self.tips.tier_last(self.hourly_max)?;
        self.tips
            .tier_stats(self.hourly_max)
            .map(|stats| stats.maximum * self.settings.mm_per_tip)
    }

    /// Count tips from `edges` until cancelled
    pub async fn run_edges(&self, mut edges: Box<dyn EdgeSource>, cancel: CancellationToken) {
        info!("Starting tip bucket monitor");
        loop {
            tokio::select! {
                edge = edges.wait_for_edge() => match edge {
                    Ok(()) => self.record_tip(),
                    Err(e) => {
                        warn!("Rain gauge input failed: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(EDGE_RETRY_DELAY) => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }
        debug!("Tip bucket monitor cancelled");
    }

    /// Roll the tick counter into the tip buffer every tick until cancelled
    pub async fn run_ticks(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.settings.tick() as u64);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.roll_tick(),
                _ = cancel.cancelled() => {
                    debug!("Rain tick loop cancelled");
                    break;
                }
            }
        }
    }
}
