//! Simulated station hardware
//!
//! Lets the station run on a machine with no sensors attached. Readings follow
//! slow deterministic cycles so the status endpoint and uploads show plausible,
//! changing weather.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::Result;
use crate::io::{
    DirectionSensor, EdgeSource, EnvironmentReading, HardwareFactory, OutputPin,
    PressureHumiditySource, PulseCounter, TemperatureSource,
};

/// Vane voltages visited in turn: roughly W, WSW, SW, WSW
const VANE_CYCLE: [f64; 4] = [4.60, 2.90, 3.10, 2.90];
const SAMPLES_PER_VANE_STEP: u64 = 240;

/// Simulated pulse counter: a light breeze with a gust every 50 samples
#[derive(Debug, Default)]
struct SimulatedCounter {
    samples: AtomicU64,
}

#[async_trait]
impl PulseCounter for SimulatedCounter {
    async fn read_count(&self) -> Result<u32> {
        let n = self.samples.fetch_add(1, Ordering::Relaxed);
        let pulses = match n % 50 {
            20..=31 => 4,
            _ if n % 3 == 0 => 2,
            _ => 1,
        };
        Ok(pulses)
    }
}

#[derive(Debug, Default)]
struct SimulatedVane {
    reads: AtomicU64,
}

#[async_trait]
impl DirectionSensor for SimulatedVane {
    async fn read_volts(&self) -> Result<f64> {
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        let step = (n / SAMPLES_PER_VANE_STEP) as usize % VANE_CYCLE.len();
        Ok(VANE_CYCLE[step])
    }
}

/// Bucket tips at a fixed interval
#[derive(Debug)]
struct SimulatedRain {
    interval: Duration,
}

#[async_trait]
impl EdgeSource for SimulatedRain {
    async fn wait_for_edge(&mut self) -> Result<()> {
        tokio::time::sleep(self.interval).await;
        Ok(())
    }
}

/// Diurnal-ish temperature swing around 12 °C
#[derive(Debug, Default)]
struct SimulatedTemperature {
    reads: AtomicU64,
}

#[async_trait]
impl TemperatureSource for SimulatedTemperature {
    fn name(&self) -> String {
        "simulated probe".to_string()
    }

    async fn read_temperature(&self) -> Result<f64> {
        let n = self.reads.fetch_add(1, Ordering::Relaxed) as f64;
        Ok(12.0 + 4.0 * (n / 240.0).sin())
    }
}

#[derive(Debug, Default)]
struct SimulatedEnvironment {
    reads: AtomicU64,
}

#[async_trait]
impl PressureHumiditySource for SimulatedEnvironment {
    async fn read_environment(&self) -> Result<EnvironmentReading> {
        let n = self.reads.fetch_add(1, Ordering::Relaxed) as f64;
        Ok(EnvironmentReading {
            pressure_pa: 101_020.0 + 150.0 * (n / 600.0).cos(),
            humidity_percent: 75.0 + 10.0 * (n / 300.0).sin(),
            temperature_c: 12.4 + 4.0 * (n / 240.0).sin(),
        })
    }
}

#[derive(Debug)]
struct SimulatedPin {
    path: String,
    level: AtomicBool,
}

impl OutputPin for SimulatedPin {
    fn set_level(&self, high: bool) -> Result<()> {
        self.level.store(high, Ordering::Relaxed);
        trace!("Simulated pin {} -> {}", self.path, high);
        Ok(())
    }
}

/// Hardware factory backed entirely by simulated sensors
#[derive(Debug, Clone)]
pub struct SimulatedHardware {
    tip_interval: Duration,
}

impl SimulatedHardware {
    pub fn new(tip_interval: Duration) -> Self {
        Self { tip_interval }
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new(Duration::from_secs(45))
    }
}

#[async_trait]
impl HardwareFactory for SimulatedHardware {
    async fn pulse_counter(&self) -> Result<Arc<dyn PulseCounter>> {
        debug!("Using simulated anemometer");
        Ok(Arc::new(SimulatedCounter::default()))
    }

    async fn direction_sensor(&self) -> Result<Arc<dyn DirectionSensor>> {
        Ok(Arc::new(SimulatedVane::default()))
    }

    async fn rain_edges(&self) -> Result<Box<dyn EdgeSource>> {
        debug!("Using simulated rain gauge, one tip every {:?}", self.tip_interval);
        Ok(Box::new(SimulatedRain {
            interval: self.tip_interval,
        }))
    }

    async fn primary_temperature(&self) -> Result<Arc<dyn TemperatureSource>> {
        Ok(Arc::new(SimulatedTemperature::default()))
    }

    async fn environment_sensor(&self) -> Result<Arc<dyn PressureHumiditySource>> {
        Ok(Arc::new(SimulatedEnvironment::default()))
    }

    async fn output_pin(&self, path: &str) -> Result<Arc<dyn OutputPin>> {
        Ok(Arc::new(SimulatedPin {
            path: path.to_string(),
            level: AtomicBool::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compass::volts_to_degrees;

    #[tokio::test]
    async fn counter_gusts_periodically() {
        let counter = SimulatedCounter::default();
        let mut counts = Vec::new();
        for _ in 0..50 {
            counts.push(counter.read_count().await.unwrap());
        }
        assert_eq!(counts[20..32], [4; 12]);
        assert!(counts[..20].iter().all(|&c| c <= 2));
    }

    #[tokio::test]
    async fn vane_voltages_are_in_the_table() {
        let vane = SimulatedVane::default();
        for _ in 0..4 {
            let volts = vane.read_volts().await.unwrap();
            assert!(volts_to_degrees(volts) >= 200.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rain_tips_on_interval() {
        let factory = SimulatedHardware::new(Duration::from_secs(30));
        let mut edges = factory.rain_edges().await.unwrap();

        let start = tokio::time::Instant::now();
        edges.wait_for_edge().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn environment_is_plausible() {
        let factory = SimulatedHardware::default();
        let sensor = factory.environment_sensor().await.unwrap();
        let reading = sensor.read_environment().await.unwrap();
        assert!((95_000.0..105_000.0).contains(&reading.pressure_pa));
        assert!((0.0..=100.0).contains(&reading.humidity_percent));
    }
}
