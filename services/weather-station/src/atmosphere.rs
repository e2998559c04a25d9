//! Temperature, pressure and humidity fusion
//!
//! Temperature comes from an ordered list of providers; the first one that
//! reads successfully wins. Nothing about provider health is remembered
//! between calls. Pressure and humidity come from a single combined sensor.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::io::{PressureHumiditySource, TemperatureSource};
use crate::physics::round_to;

/// Station pressure and relative humidity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureHumidity {
    pub pressure_hpa: f64,
    pub humidity_percent: f64,
}

#[derive(Default)]
pub struct Atmosphere {
    temperature: Vec<Arc<dyn TemperatureSource>>,
    environment: Option<Arc<dyn PressureHumiditySource>>,
}

impl std::fmt::Debug for Atmosphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atmosphere")
            .field(
                "temperature",
                &self.temperature.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("environment", &self.environment.is_some())
            .finish()
    }
}

impl Atmosphere {
    pub fn new(
        temperature: Vec<Arc<dyn TemperatureSource>>,
        environment: Option<Arc<dyn PressureHumiditySource>>,
    ) -> Self {
        Self {
            temperature,
            environment,
        }
    }

    /// Number of temperature providers, in priority order
    pub fn temperature_sources(&self) -> usize {
        self.temperature.len()
    }

    pub fn has_environment_sensor(&self) -> bool {
        self.environment.is_some()
    }

    /// Temperature in °C from the first provider that answers
    pub async fn temperature(&self) -> Option<f64> {
        for source in &self.temperature {
            match source.read_temperature().await {
                Ok(celsius) => {
                    debug!("Temperature {:.2} °C from {}", celsius, source.name());
                    return Some(celsius);
                }
                Err(e) => warn!("{} temperature read failed: {}", source.name(), e),
            }
        }
        None
    }

    /// Like [`Atmosphere::temperature`], with 0 °C standing in for no reading
    pub async fn temperature_or_zero(&self) -> f64 {
        self.temperature().await.unwrap_or(0.0)
    }

    /// Pressure in hPa (2 dp) and relative humidity in whole percent
    pub async fn read_humidity_and_pressure(&self) -> Option<PressureHumidity> {
        let sensor = self.environment.as_ref()?;
        match sensor.read_environment().await {
            Ok(reading) => Some(PressureHumidity {
                pressure_hpa: round_to(reading.pressure_pa / 100.0, 2),
                humidity_percent: reading.humidity_percent.round(),
            }),
            Err(e) => {
                warn!("Pressure/humidity read failed: {}", e);
                None
            }
        }
    }

    /// `(hPa, %RH)`, zeros when the sensor cannot be read
    pub async fn humidity_and_pressure(&self) -> (f64, f64) {
        self.read_humidity_and_pressure()
            .await
            .map(|r| (r.pressure_hpa, r.humidity_percent))
            .unwrap_or((0.0, 0.0))
    }
}

/// Exposes the temperature channel of a combined sensor as a fallback provider
pub struct EnvironmentTemperature {
    sensor: Arc<dyn PressureHumiditySource>,
}

impl EnvironmentTemperature {
    pub fn new(sensor: Arc<dyn PressureHumiditySource>) -> Self {
        Self { sensor }
    }
}

#[async_trait]
impl TemperatureSource for EnvironmentTemperature {
    fn name(&self) -> String {
        "environment sensor".to_string()
    }

    async fn read_temperature(&self) -> Result<f64> {
        Ok(self.sensor.read_environment().await?.temperature_c)
    }
}
