//! Configuration types for the weather station

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StationError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wind: WindConfig,
    #[serde(default)]
    pub rain: RainConfig,
    #[serde(default)]
    pub atmosphere: AtmosphereConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Anemometer and wind vane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_samples_per_second")]
    pub samples_per_second: u32,
    #[serde(default = "default_speed_window")]
    pub speed_window_seconds: u32,
    #[serde(default = "default_gust_window")]
    pub gust_window_seconds: u32,
    #[serde(default = "default_direction_window")]
    pub direction_window_seconds: u32,
    #[serde(default = "default_gust_width")]
    pub gust_width_seconds: u32,
    #[serde(default = "default_mph_per_tick")]
    pub mph_per_tick: f64,
    #[serde(default = "default_gust_ceiling")]
    pub gust_ceiling_mph: f64,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: String,
    #[serde(default = "default_masthead_address")]
    pub masthead_address: u16,
    #[serde(default = "default_direction_raw_path")]
    pub direction_raw_path: String,
    #[serde(default = "default_direction_scale_path")]
    pub direction_scale_path: String,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            samples_per_second: default_samples_per_second(),
            speed_window_seconds: default_speed_window(),
            gust_window_seconds: default_gust_window(),
            direction_window_seconds: default_direction_window(),
            gust_width_seconds: default_gust_width(),
            mph_per_tick: default_mph_per_tick(),
            gust_ceiling_mph: default_gust_ceiling(),
            i2c_bus: default_i2c_bus(),
            masthead_address: default_masthead_address(),
            direction_raw_path: default_direction_raw_path(),
            direction_scale_path: default_direction_scale_path(),
        }
    }
}

/// Tipping bucket rain gauge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RainConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mm_per_tip")]
    pub mm_per_tip: f64,
    #[serde(default = "default_rain_tick")]
    pub tick_seconds: u32,
    #[serde(default = "default_rain_window")]
    pub window_seconds: u32,
    #[serde(default = "default_rollup_slots")]
    pub rollup_slots: usize,
    /// GPIO character device carrying the reed switch
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,
    #[serde(default = "default_gpio_line")]
    pub gpio_line: u32,
    #[serde(default = "default_glitch_ms")]
    pub glitch_ms: u64,
    #[serde(default = "default_holdoff_ms")]
    pub holdoff_ms: u64,
    /// Indicator flashed on every tip
    #[serde(default)]
    pub led_path: Option<String>,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mm_per_tip: default_mm_per_tip(),
            tick_seconds: default_rain_tick(),
            window_seconds: default_rain_window(),
            rollup_slots: default_rollup_slots(),
            gpio_chip: default_gpio_chip(),
            gpio_line: default_gpio_line(),
            glitch_ms: default_glitch_ms(),
            holdoff_ms: default_holdoff_ms(),
            led_path: None,
        }
    }
}

/// Temperature, pressure and humidity sensors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtmosphereConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_temperature_path")]
    pub temperature_path: String,
    #[serde(default = "default_environment_dir")]
    pub environment_dir: String,
    /// Station altitude above mean sea level in metres
    #[serde(default = "default_altitude")]
    pub altitude_m: f64,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature_path: default_temperature_path(),
            environment_dir: default_environment_dir(),
            altitude_m: default_altitude(),
        }
    }
}

/// Reporting composer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_report_tick")]
    pub tick_seconds: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_minutes: u64,
    /// UTC hour at which the rain day rolls over
    #[serde(default = "default_rain_day_start")]
    pub rain_day_start_hour_utc: u32,
    #[serde(default = "default_software_type")]
    pub software_type: String,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default)]
    pub wow: Option<WowConfig>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_report_tick(),
            report_interval_minutes: default_report_interval(),
            rain_day_start_hour_utc: default_rain_day_start(),
            software_type: default_software_type(),
            history_size: default_history_size(),
            wow: None,
        }
    }
}

/// Met Office Weather Observations Website upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WowConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub auth_key: String,
    #[serde(default = "default_wow_url")]
    pub url: String,
}

impl Default for WowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            site_id: String::new(),
            auth_key: String::new(),
            url: default_wow_url(),
        }
    }
}

/// Status server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_server_port(),
        }
    }
}

/// Heartbeat indicator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub led_path: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub interval_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            led_path: None,
            interval_seconds: default_heartbeat_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_samples_per_second() -> u32 {
    4
}

fn default_speed_window() -> u32 {
    120
}

fn default_gust_window() -> u32 {
    600
}

fn default_direction_window() -> u32 {
    300
}

fn default_gust_width() -> u32 {
    3
}

fn default_mph_per_tick() -> f64 {
    1.429
}

fn default_gust_ceiling() -> f64 {
    120.0
}

fn default_i2c_bus() -> String {
    "/dev/i2c-1".to_string()
}

fn default_masthead_address() -> u16 {
    0x55
}

fn default_direction_raw_path() -> String {
    "/sys/bus/iio/devices/iio:device0/in_voltage0_raw".to_string()
}

fn default_direction_scale_path() -> String {
    "/sys/bus/iio/devices/iio:device0/in_voltage_scale".to_string()
}

fn default_mm_per_tip() -> f64 {
    0.2794
}

fn default_rain_tick() -> u32 {
    10
}

fn default_rain_window() -> u32 {
    3600
}

fn default_rollup_slots() -> usize {
    24
}

fn default_gpio_chip() -> String {
    "/dev/gpiochip0".to_string()
}

fn default_gpio_line() -> u32 {
    17
}

fn default_glitch_ms() -> u64 {
    10
}

fn default_holdoff_ms() -> u64 {
    500
}

fn default_temperature_path() -> String {
    "/sys/class/hwmon/hwmon0/temp1_input".to_string()
}

fn default_environment_dir() -> String {
    "/sys/bus/iio/devices/iio:device1".to_string()
}

fn default_altitude() -> f64 {
    24.71
}

fn default_report_tick() -> u64 {
    60
}

fn default_report_interval() -> u64 {
    10
}

fn default_rain_day_start() -> u32 {
    9
}

fn default_software_type() -> String {
    concat!("weather-station ", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_history_size() -> usize {
    100
}

fn default_wow_url() -> String {
    "http://wow.metoffice.gov.uk/automaticreading".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Config {
    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        let wind = &self.wind;
        if wind.samples_per_second == 0 {
            return Err(invalid("wind.samples_per_second must be at least 1"));
        }
        if wind.speed_window_seconds == 0
            || wind.gust_window_seconds == 0
            || wind.direction_window_seconds == 0
        {
            return Err(invalid("wind windows must be at least one second"));
        }
        if wind.gust_width_seconds == 0 || wind.gust_width_seconds > wind.gust_window_seconds {
            return Err(invalid(
                "wind.gust_width_seconds must be between 1 and gust_window_seconds",
            ));
        }
        if wind.mph_per_tick <= 0.0 || wind.gust_ceiling_mph <= 0.0 {
            return Err(invalid("wind calibration values must be positive"));
        }

        let rain = &self.rain;
        if rain.mm_per_tip <= 0.0 {
            return Err(invalid("rain.mm_per_tip must be positive"));
        }
        if rain.tick_seconds == 0 || rain.window_seconds < rain.tick_seconds {
            return Err(invalid(
                "rain.tick_seconds must be at least 1 and no longer than window_seconds",
            ));
        }
        if rain.rollup_slots == 0 {
            return Err(invalid("rain.rollup_slots must be at least 1"));
        }

        let reporting = &self.reporting;
        if reporting.tick_seconds == 0 || reporting.report_interval_minutes == 0 {
            return Err(invalid("reporting intervals must be at least 1"));
        }
        if reporting.rain_day_start_hour_utc >= 24 {
            return Err(invalid("reporting.rain_day_start_hour_utc must be below 24"));
        }

        if self.heartbeat.interval_seconds == 0 {
            return Err(invalid("heartbeat.interval_seconds must be at least 1"));
        }

        Ok(())
    }

    /// Fill WOW credentials left out of the file from `WOW_SITE_ID` and `WOW_AUTH_KEY`
    pub fn resolve_secrets(&mut self) {
        self.resolve_secrets_with(|key| std::env::var(key).ok());
    }

    fn resolve_secrets_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(wow) = self.reporting.wow.as_mut() {
            if wow.site_id.is_empty() {
                if let Some(id) = lookup("WOW_SITE_ID") {
                    wow.site_id = id;
                }
            }
            if wow.auth_key.is_empty() {
                if let Some(key) = lookup("WOW_AUTH_KEY") {
                    wow.auth_key = key;
                }
            }
        }
    }
}

fn invalid(message: &str) -> StationError {
    StationError::Config(message.to_string())
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        StationError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
