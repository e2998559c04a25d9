//! Wind pipeline scenarios driven through scripted hardware

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use weather_station::io::{DirectionSensor, PulseCounter};
use weather_station::{Anemometer, AnemometerSettings, StationError};

const MPH: f64 = 1.429;

/// Pulse counter replaying a script, then a constant count
struct ScriptedCounter {
    script: Mutex<VecDeque<Option<u32>>>,
    steady: u32,
    reads: AtomicUsize,
}

impl ScriptedCounter {
    fn new(script: Vec<Option<u32>>, steady: u32) -> Self {
        Self {
            script: Mutex::new(script.into()),
            steady,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PulseCounter for ScriptedCounter {
    async fn read_count(&self) -> weather_station::Result<u32> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(count)) => Ok(count),
            Some(None) => Err(StationError::Sensor("i2c nack".to_string())),
            None => Ok(self.steady),
        }
    }
}

/// Vane returning a fixed voltage, or failing when `volts` is `None`
struct FixedVane {
    volts: Mutex<Option<f64>>,
}

impl FixedVane {
    fn new(volts: f64) -> Self {
        Self {
            volts: Mutex::new(Some(volts)),
        }
    }

    fn set(&self, volts: Option<f64>) {
        *self.volts.lock().unwrap() = volts;
    }
}

#[async_trait]
impl DirectionSensor for FixedVane {
    async fn read_volts(&self) -> weather_station::Result<f64> {
        let volts = *self.volts.lock().unwrap();
        volts.ok_or_else(|| StationError::Sensor("adc timeout".to_string()))
    }
}

fn settings() -> AnemometerSettings {
    AnemometerSettings {
        samples_per_second: 4,
        speed_window_seconds: 10,
        gust_window_seconds: 30,
        direction_window_seconds: 10,
        gust_width_seconds: 3,
        mph_per_tick: MPH,
        gust_ceiling_mph: 120.0,
    }
}

#[tokio::test]
async fn steady_breeze_from_the_southwest() {
    let counter = Arc::new(ScriptedCounter::new(Vec::new(), 2));
    let vane = Arc::new(FixedVane::new(3.10));
    let wind = Anemometer::new(settings(), counter, vane);

    for _ in 0..120 {
        wind.sample().await;
    }

    assert!((wind.speed() - 2.0 * 4.0 * MPH).abs() < 1e-9);
    assert!((wind.gust() - 2.0 * 4.0 * MPH).abs() < 1e-9);
    assert_eq!(wind.direction(), 225.0);
    assert_eq!(wind.direction_name(), "SW");
}

#[tokio::test]
async fn three_second_burst_sets_the_gust() {
    let mut script = vec![Some(1); 40];
    script.extend(vec![Some(10); 12]);
    script.extend(vec![Some(1); 40]);
    let counter = Arc::new(ScriptedCounter::new(script, 1));
    let wind = Anemometer::new(settings(), counter, Arc::new(FixedVane::new(4.6)));

    for _ in 0..92 {
        wind.sample().await;
    }

    assert!((wind.gust() - 10.0 * 4.0 * MPH).abs() < 1e-9);
    assert!(wind.speed() < wind.gust());
    assert_eq!(wind.direction_name(), "W");
}

#[tokio::test]
async fn calm_and_failed_reads_hold_direction() {
    let counter = Arc::new(ScriptedCounter::new(vec![Some(3), Some(0), None, Some(2)], 2));
    let vane = Arc::new(FixedVane::new(3.10));
    let wind = Anemometer::new(settings(), counter.clone(), vane.clone());

    wind.sample().await;
    assert_eq!(wind.direction(), 225.0);

    // Calm: the vane is not trusted, the bearing is repeated.
    vane.set(Some(0.2));
    wind.sample().await;
    assert_eq!(wind.direction(), 225.0);

    // Failed count read drops the sample entirely.
    wind.sample().await;
    assert_eq!(counter.reads.load(Ordering::SeqCst), 3);

    // Failed vane read keeps the last bearing.
    vane.set(None);
    wind.sample().await;
    assert_eq!(wind.direction(), 225.0);
}

#[tokio::test]
async fn implausible_gust_keeps_previous_value() {
    let counter = Arc::new(ScriptedCounter::new(Vec::new(), 2));
    let wind = Anemometer::new(settings(), counter, Arc::new(FixedVane::new(4.6)));
    for _ in 0..40 {
        wind.sample().await;
    }
    let valid = wind.gust();

    for _ in 0..12 {
        wind.record(60, Some(270.0));
    }
    assert_eq!(wind.gust(), valid);
}

#[tokio::test(start_paused = true)]
async fn run_samples_at_the_configured_rate() {
    let counter = Arc::new(ScriptedCounter::new(Vec::new(), 1));
    let wind = Arc::new(Anemometer::new(
        settings(),
        counter.clone(),
        Arc::new(FixedVane::new(4.6)),
    ));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(Arc::clone(&wind).run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    cancel.cancel();
    task.await.unwrap();

    // Ticks at 0, 250, ..., 2000 ms
    assert_eq!(counter.reads.load(Ordering::SeqCst), 9);
}
