//! Wind pipeline
//!
//! Samples the masthead pulse counter and the wind vane at a fixed rate and
//! keeps three rolling buffers: pulses for mean speed, pulses for gust
//! detection over a longer window, and vane bearings for mean direction.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::compass::{compass_point, volts_to_degrees};
use crate::config::WindConfig;
use crate::io::{DirectionSensor, PulseCounter};
use crate::stats::RingStatBuffer;

/// Sampling rate, window lengths and calibration for the wind pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct AnemometerSettings {
    pub samples_per_second: u32,
    pub speed_window_seconds: u32,
    pub gust_window_seconds: u32,
    pub direction_window_seconds: u32,
    pub gust_width_seconds: u32,
    pub mph_per_tick: f64,
    pub gust_ceiling_mph: f64,
}

impl AnemometerSettings {
    /// Sampling rate, never below one sample per second
    fn rate(&self) -> u32 {
        self.samples_per_second.max(1)
    }

    fn samples(&self, seconds: u32) -> usize {
        (self.rate() as usize * seconds as usize).max(1)
    }
}

impl Default for AnemometerSettings {
    fn default() -> Self {
        Self::from(&WindConfig::default())
    }
}

impl From<&WindConfig> for AnemometerSettings {
    fn from(config: &WindConfig) -> Self {
        Self {
            samples_per_second: config.samples_per_second.max(1),
            speed_window_seconds: config.speed_window_seconds,
            gust_window_seconds: config.gust_window_seconds,
            direction_window_seconds: config.direction_window_seconds,
            gust_width_seconds: config.gust_width_seconds,
            mph_per_tick: config.mph_per_tick,
            gust_ceiling_mph: config.gust_ceiling_mph,
        }
    }
}

pub struct Anemometer {
    settings: AnemometerSettings,
    counter: Arc<dyn PulseCounter>,
    vane: Arc<dyn DirectionSensor>,
    speed_buf: RingStatBuffer,
    gust_buf: RingStatBuffer,
    dir_buf: RingStatBuffer,
    last_gust: Mutex<f64>,
}

impl std::fmt::Debug for Anemometer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Anemometer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Anemometer {
    pub fn new(
        settings: AnemometerSettings,
        counter: Arc<dyn PulseCounter>,
        vane: Arc<dyn DirectionSensor>,
    ) -> Self {
        let speed_buf = RingStatBuffer::new(settings.samples(settings.speed_window_seconds));
        let gust_buf = RingStatBuffer::new(settings.samples(settings.gust_window_seconds));
        let dir_buf = RingStatBuffer::new(settings.samples(settings.direction_window_seconds));

        Self {
            settings,
            counter,
            vane,
            speed_buf,
            gust_buf,
            dir_buf,
            last_gust: Mutex::new(0.0),
        }
    }

    pub fn settings(&self) -> &AnemometerSettings {
        &self.settings
    }

    /// Store one sample.
    ///
    /// A bearing is only meaningful while the cups turn, so with zero pulses
    /// (or no bearing) the previous direction is repeated.
    pub fn record(&self, pulses: u32, bearing: Option<f64>) {
        let pulses = pulses as f64;
        self.speed_buf.add_item(pulses);
        self.gust_buf.add_item(pulses);

        let bearing = match bearing {
            Some(degrees) if pulses > 0.0 => degrees,
            _ => self.dir_buf.last(),
        };
        self.dir_buf.add_item(bearing);
    }

    /// Read the hardware once and record the result.
    ///
    /// A failed count read drops the sample; a failed vane read holds the
    /// previous direction.
    pub async fn sample(&self) {
        let pulses = match self.counter.read_count().await {
            Ok(pulses) => pulses,
            Err(e) => {
                warn!("Wind pulse count read failed, skipping sample: {}", e);
                return;
            }
        };

        let bearing = if pulses == 0 {
            None
        } else {
            match self.vane.read_volts().await {
                Ok(volts) => Some(volts_to_degrees(volts)),
                Err(e) => {
                    warn!("Wind vane read failed, holding last direction: {}", e);
                    None
                }
            }
        };

        debug!("Wind sample: {} pulses, bearing {:?}", pulses, bearing);
        self.record(pulses, bearing);
    }

    /// Mean wind speed over the speed window in mph
    pub fn speed(&self) -> f64 {
        let ticks_per_sample = self.speed_buf.average_min_max_sum().average;
        ticks_per_sample * self.settings.rate() as f64 * self.settings.mph_per_tick
    }

    /// Highest mean speed over any gust-width span of the gust window, in mph.
    ///
    /// Values above the configured ceiling are treated as interference and the
    /// previous valid gust is returned instead.
    pub fn gust(&self) -> f64 {
        let raw = self.gust_buf.raw_data();
        let rate = self.settings.rate();
        let width = (rate as usize * self.settings.gust_width_seconds as usize).clamp(1, raw.size);
        let width_seconds = width as f64 / rate as f64;

        let peak = max_circular_window_sum(&raw.data, width);
        let gust = peak / width_seconds * self.settings.mph_per_tick;

        let mut last = self.last_gust.lock().unwrap_or_else(PoisonError::into_inner);
        if gust > self.settings.gust_ceiling_mph {
            warn!(
                "Discarding implausible gust of {:.1} mph (ceiling {:.1} mph), keeping {:.1} mph",
                gust, self.settings.gust_ceiling_mph, *last
            );
            return *last;
        }
        *last = gust;
        gust
    }

    /// Mean vane bearing over the direction window in degrees
    pub fn direction(&self) -> f64 {
        self.dir_buf.average_min_max_sum().average
    }

    pub fn direction_name(&self) -> &'static str {
        compass_point(self.direction())
    }

    /// Sample at the configured rate until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = Duration::from_secs_f64(1.0 / self.settings.rate() as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.sample().await,
                _ = cancel.cancelled() => {
                    debug!("Wind sampler cancelled");
                    break;
                }
            }
        }
    }
}

/// Largest sum over `width` consecutive slots, wrapping from the end back to
/// the start of `data`
pub fn max_circular_window_sum(data: &[f64], width: usize) -> f64 {
    if data.is_empty() || width == 0 {
        return 0.0;
    }
    let width = width.min(data.len());

    (0..data.len())
        .map(|start| (0..width).map(|i| data[(start + i) % data.len()]).sum::<f64>())
        .fold(f64::MIN, f64::max)
}
