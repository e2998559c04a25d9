//! Configuration loading and validation tests

use std::io::Write;

use tempfile::NamedTempFile;
use weather_station::config::{Config, HeartbeatConfig, RainConfig, ServerConfig, WindConfig};
use weather_station::{load_config, StationError};

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn default_config_has_expected_values() {
    let config = Config::default();

    assert!(config.wind.enabled);
    assert_eq!(config.wind.samples_per_second, 4);
    assert_eq!(config.wind.speed_window_seconds, 120);
    assert_eq!(config.wind.gust_window_seconds, 600);
    assert_eq!(config.wind.direction_window_seconds, 300);
    assert_eq!(config.wind.gust_width_seconds, 3);
    assert_eq!(config.wind.gust_ceiling_mph, 120.0);

    assert!(config.rain.enabled);
    assert_eq!(config.rain.glitch_ms, 10);
    assert_eq!(config.rain.holdoff_ms, 500);
    assert_eq!(config.rain.rollup_slots, 24);
    assert!(config.rain.led_path.is_none());

    assert!(config.atmosphere.enabled);
    assert_eq!(config.atmosphere.altitude_m, 24.71);

    assert_eq!(config.reporting.tick_seconds, 60);
    assert_eq!(config.reporting.report_interval_minutes, 10);
    assert!(config.reporting.software_type.starts_with("weather-station "));
    assert!(config.reporting.wow.is_none());

    assert!(config.server.enabled);
    assert!(config.heartbeat.led_path.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn section_defaults_match_config_default() {
    let config = Config::default();
    assert_eq!(WindConfig::default().i2c_bus, config.wind.i2c_bus);
    assert_eq!(RainConfig::default().gpio_chip, config.rain.gpio_chip);
    assert_eq!(RainConfig::default().gpio_line, config.rain.gpio_line);
    assert_eq!(ServerConfig::default().port, config.server.port);
    assert_eq!(
        HeartbeatConfig::default().interval_seconds,
        config.heartbeat.interval_seconds
    );
}

#[test]
fn load_config_from_file() {
    let file = write_config(
        r#"{
            "wind": { "masthead_address": 80, "gust_ceiling_mph": 90.0 },
            "rain": { "enabled": false },
            "atmosphere": { "altitude_m": 310.5 },
            "reporting": {
                "rain_day_start_hour_utc": 0,
                "wow": { "site_id": "abc", "auth_key": "123", "enabled": false }
            },
            "server": { "port": 9090 },
            "heartbeat": { "led_path": "/sys/class/gpio/gpio22/value", "interval_seconds": 15 }
        }"#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.wind.masthead_address, 80);
    assert_eq!(config.wind.gust_ceiling_mph, 90.0);
    assert_eq!(config.wind.samples_per_second, 4);
    assert!(!config.rain.enabled);
    assert_eq!(config.atmosphere.altitude_m, 310.5);
    assert_eq!(config.reporting.rain_day_start_hour_utc, 0);

    let wow = config.reporting.wow.as_ref().unwrap();
    assert_eq!(wow.site_id, "abc");
    assert!(!wow.enabled);
    assert_eq!(wow.url, "http://wow.metoffice.gov.uk/automaticreading");

    assert_eq!(config.server.port, 9090);
    assert_eq!(
        config.heartbeat.led_path.as_deref(),
        Some("/sys/class/gpio/gpio22/value")
    );
    assert!(config.validate().is_ok());
}

#[test]
fn load_config_missing_file() {
    let err = load_config(std::path::Path::new("/nonexistent/station.json")).unwrap_err();
    match err {
        StationError::Config(msg) => assert!(msg.contains("Failed to read config file")),
        other => panic!("expected Config error, got {other:?}"),
    }
}

#[test]
fn load_config_invalid_json() {
    let file = write_config("{ not json");
    assert!(matches!(
        load_config(file.path()),
        Err(StationError::Json(_))
    ));
}

fn assert_rejected(name: &str, mutate: impl Fn(&mut Config)) {
    let mut config = Config::default();
    mutate(&mut config);
    assert!(
        matches!(config.validate(), Err(StationError::Config(_))),
        "{name} should be rejected"
    );
}

#[test]
fn validate_rejects_unusable_settings() {
    assert_rejected("zero sample rate", |c| c.wind.samples_per_second = 0);
    assert_rejected("zero speed window", |c| c.wind.speed_window_seconds = 0);
    assert_rejected("gust width beyond window", |c| {
        c.wind.gust_window_seconds = 2;
        c.wind.gust_width_seconds = 3;
    });
    assert_rejected("negative calibration", |c| c.wind.mph_per_tick = -1.0);
    assert_rejected("zero tip volume", |c| c.rain.mm_per_tip = 0.0);
    assert_rejected("tick longer than window", |c| c.rain.tick_seconds = 7200);
    assert_rejected("no rollup slots", |c| c.rain.rollup_slots = 0);
    assert_rejected("zero report interval", |c| {
        c.reporting.report_interval_minutes = 0
    });
    assert_rejected("day start hour 24", |c| {
        c.reporting.rain_day_start_hour_utc = 24
    });
    assert_rejected("zero heartbeat", |c| c.heartbeat.interval_seconds = 0);
}
