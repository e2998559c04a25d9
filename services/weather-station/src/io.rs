//! I/O traits for the station's hardware and network collaborators
//!
//! The pipelines only ever talk to sensors through these traits, so they can be
//! driven by mockall mocks or the simulated hardware in tests. Production
//! implementations live in [`crate::linux`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, StationError};

/// Anemometer pulse counter
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PulseCounter: Send + Sync {
    /// Number of rotation pulses counted since the previous call
    async fn read_count(&self) -> Result<u32>;
}

/// Wind vane voltage source
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait DirectionSensor: Send + Sync {
    /// Current vane voltage in volts
    async fn read_volts(&self) -> Result<f64>;
}

/// Rain gauge edge source
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait EdgeSource: Send {
    /// Wait until the next accepted bucket tip
    ///
    /// Blocks until a tip arrives; an error means the input could not be read.
    async fn wait_for_edge(&mut self) -> Result<()>;
}

/// Raw digital input that reports level changes as the kernel sees them
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait LevelEvents: Send {
    /// Wait for the next level change and return the new level
    async fn next_level(&mut self) -> Result<bool>;
}

/// A sensor that can report air temperature
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait TemperatureSource: Send + Sync {
    /// Human readable sensor name used in logs
    fn name(&self) -> String;

    /// Temperature in degrees Celsius
    async fn read_temperature(&self) -> Result<f64>;
}

/// One reading from a combined pressure/humidity/temperature sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    pub pressure_pa: f64,
    pub humidity_percent: f64,
    pub temperature_c: f64,
}

/// Combined pressure/humidity/temperature sensor
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PressureHumiditySource: Send + Sync {
    async fn read_environment(&self) -> Result<EnvironmentReading>;
}

/// Digital output driving an indicator LED
#[cfg_attr(test, mockall::automock)]
pub trait OutputPin: Send + Sync {
    fn set_level(&self, high: bool) -> Result<()>;
}

/// Opens the station's hardware
///
/// Each method is called once at start-up. An error means that part of the
/// station is unavailable; the rest keeps running.
#[async_trait]
pub trait HardwareFactory: Send + Sync {
    async fn pulse_counter(&self) -> Result<Arc<dyn PulseCounter>>;

    async fn direction_sensor(&self) -> Result<Arc<dyn DirectionSensor>>;

    async fn rain_edges(&self) -> Result<Box<dyn EdgeSource>>;

    /// High resolution temperature sensor tried before the combined sensor
    async fn primary_temperature(&self) -> Result<Arc<dyn TemperatureSource>>;

    async fn environment_sensor(&self) -> Result<Arc<dyn PressureHumiditySource>>;

    /// Output pin at `path`, used for the tip and heartbeat indicators
    async fn output_pin(&self, path: &str) -> Result<Arc<dyn OutputPin>>;
}

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound HTTP used by report uploaders
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a POST request with form-encoded body
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse>;
}

/// Production HTTP client using reqwest
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StationError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| StationError::Http(format!("POST {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StationError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("POST {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}
