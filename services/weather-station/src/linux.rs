//! Linux hardware adapters
//!
//! The masthead pulse counter sits on an I²C bus. The vane, the pressure and
//! humidity sensor and the temperature probe are read through the kernel's IIO
//! and hwmon sysfs interfaces. The rain gauge is a GPIO line on a character
//! device and the LEDs use sysfs GPIO.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gpiocdev::line::{EdgeDetection, EdgeKind, Value};
use gpiocdev::tokio::AsyncRequest;
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use tracing::{debug, info};

use crate::config::Config;
use crate::debounce::DebouncedEdges;
use crate::error::{Result, StationError};
use crate::io::{
    DirectionSensor, EdgeSource, EnvironmentReading, HardwareFactory, LevelEvents, OutputPin,
    PressureHumiditySource, PulseCounter, TemperatureSource,
};

const COUNTER_REGISTER: u8 = 0x00;
const GPIO_CONSUMER: &str = "weather-station";

/// Read a single numeric sysfs attribute
async fn read_sysfs_value(path: &Path) -> Result<f64> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StationError::SensorNotFound(path.display().to_string()))
        }
        Err(e) => return Err(StationError::Io(e)),
    };
    parse_sysfs_value(path, &text)
}

fn parse_sysfs_value(path: &Path, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        StationError::Sensor(format!(
            "{}: unexpected value {:?}",
            path.display(),
            text.trim()
        ))
    })
}

fn require_device(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        Ok(())
    } else {
        Err(StationError::SensorNotFound(path.to_string()))
    }
}

/// Pulse counter on the masthead microcontroller.
///
/// Reading register 0 returns the pulses counted since the previous read as a
/// little-endian `u32`, and clears the count.
pub struct I2cPulseCounter {
    device: Arc<Mutex<LinuxI2CDevice>>,
    bus: String,
    address: u16,
}

impl I2cPulseCounter {
    pub async fn open(bus: &str, address: u16) -> Result<Self> {
        require_device(bus)?;
        let path = bus.to_string();
        let device = tokio::task::spawn_blocking(move || LinuxI2CDevice::new(&path, address))
            .await
            .map_err(|e| StationError::Sensor(format!("I2C open task failed: {}", e)))?
            .map_err(|e| {
                StationError::Sensor(format!(
                    "I2C open of {} @ {:#04x} failed: {}",
                    bus, address, e
                ))
            })?;

        info!("Opened masthead counter at {} address {:#04x}", bus, address);
        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            bus: bus.to_string(),
            address,
        })
    }
}

#[async_trait]
impl PulseCounter for I2cPulseCounter {
    async fn read_count(&self) -> Result<u32> {
        let device = Arc::clone(&self.device);
        let count = tokio::task::spawn_blocking(move || {
            let mut device = device.lock().unwrap_or_else(PoisonError::into_inner);
            let mut buf = [0u8; 4];
            device.write(&[COUNTER_REGISTER])?;
            device.read(&mut buf)?;
            Ok::<_, i2cdev::linux::LinuxI2CError>(u32::from_le_bytes(buf))
        })
        .await
        .map_err(|e| StationError::Sensor(format!("I2C read task failed: {}", e)))?
        .map_err(|e| {
            StationError::Sensor(format!(
                "I2C read from {} @ {:#04x} failed: {}",
                self.bus, self.address, e
            ))
        })?;

        debug!("Masthead count {}", count);
        Ok(count)
    }
}

/// Voltage on an IIO ADC channel: `raw × scale` millivolts
pub struct IioVoltage {
    raw_path: PathBuf,
    scale_path: PathBuf,
}

impl IioVoltage {
    pub async fn open(raw_path: &str, scale_path: &str) -> Result<Self> {
        let channel = Self {
            raw_path: PathBuf::from(raw_path),
            scale_path: PathBuf::from(scale_path),
        };
        channel.read_volts().await?;
        Ok(channel)
    }
}

#[async_trait]
impl DirectionSensor for IioVoltage {
    async fn read_volts(&self) -> Result<f64> {
        let raw = read_sysfs_value(&self.raw_path).await?;
        let scale = read_sysfs_value(&self.scale_path).await?;
        Ok(raw * scale / 1000.0)
    }
}

/// hwmon temperature input in millidegrees Celsius
#[derive(Debug)]
pub struct HwmonTemperature {
    path: PathBuf,
}

impl HwmonTemperature {
    pub async fn open(path: &str) -> Result<Self> {
        let sensor = Self {
            path: PathBuf::from(path),
        };
        sensor.read_temperature().await?;
        Ok(sensor)
    }
}

#[async_trait]
impl TemperatureSource for HwmonTemperature {
    fn name(&self) -> String {
        format!("hwmon {}", self.path.display())
    }

    async fn read_temperature(&self) -> Result<f64> {
        Ok(read_sysfs_value(&self.path).await? / 1000.0)
    }
}

/// Combined pressure/humidity/temperature sensor exposed through IIO
///
/// Units follow the IIO ABI: temperature in m°C, pressure in kPa and relative
/// humidity in milli-percent.
pub struct IioEnvironment {
    dir: PathBuf,
}

impl IioEnvironment {
    pub async fn open(dir: &str) -> Result<Self> {
        let sensor = Self {
            dir: PathBuf::from(dir),
        };
        sensor.read_environment().await?;
        Ok(sensor)
    }
}

#[async_trait]
impl PressureHumiditySource for IioEnvironment {
    async fn read_environment(&self) -> Result<EnvironmentReading> {
        let temperature = read_sysfs_value(&self.dir.join("in_temp_input")).await?;
        let pressure = read_sysfs_value(&self.dir.join("in_pressure_input")).await?;
        let humidity = read_sysfs_value(&self.dir.join("in_humidityrelative_input")).await?;
        Ok(EnvironmentReading {
            pressure_pa: pressure * 1000.0,
            humidity_percent: humidity / 1000.0,
            temperature_c: temperature / 1000.0,
        })
    }
}

/// Rain gauge reed switch on a GPIO character device line.
///
/// The kernel reports both edges; each event yields the new level.
pub struct GpioLineEvents {
    request: AsyncRequest,
}

impl GpioLineEvents {
    /// Request `line` on `chip` and return it with its current level
    pub fn open(chip: &str, line: u32) -> Result<(Self, bool)> {
        require_device(chip)?;
        let gpio_error =
            |e: gpiocdev::Error| StationError::Sensor(format!("{} line {}: {}", chip, line, e));

        let request = gpiocdev::Request::builder()
            .on_chip(chip)
            .with_consumer(GPIO_CONSUMER)
            .with_line(line)
            .as_input()
            .with_edge_detection(EdgeDetection::BothEdges)
            .request()
            .map_err(gpio_error)?;
        let level = matches!(request.value(line).map_err(gpio_error)?, Value::Active);

        info!("Watching rain gauge on {} line {}", chip, line);
        Ok((
            Self {
                request: AsyncRequest::new(request),
            },
            level,
        ))
    }
}

#[async_trait]
impl LevelEvents for GpioLineEvents {
    async fn next_level(&mut self) -> Result<bool> {
        let event = self
            .request
            .read_edge_event()
            .await
            .map_err(|e| StationError::Sensor(format!("GPIO edge read failed: {}", e)))?;
        Ok(matches!(event.kind, EdgeKind::Rising))
    }
}

/// sysfs GPIO output value file
#[derive(Debug)]
pub struct SysfsOutputPin {
    path: PathBuf,
}

impl SysfsOutputPin {
    pub fn open(path: &str) -> Result<Self> {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(StationError::SensorNotFound(path.display().to_string()));
        }
        Ok(Self { path })
    }
}

impl OutputPin for SysfsOutputPin {
    fn set_level(&self, high: bool) -> Result<()> {
        std::fs::write(&self.path, if high { "1" } else { "0" })?;
        Ok(())
    }
}

/// Opens the station hardware described by [`Config`]
#[derive(Debug, Clone)]
pub struct LinuxHardware {
    config: Config,
}

impl LinuxHardware {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl HardwareFactory for LinuxHardware {
    async fn pulse_counter(&self) -> Result<Arc<dyn PulseCounter>> {
        let wind = &self.config.wind;
        Ok(Arc::new(
            I2cPulseCounter::open(&wind.i2c_bus, wind.masthead_address).await?,
        ))
    }

    async fn direction_sensor(&self) -> Result<Arc<dyn DirectionSensor>> {
        let wind = &self.config.wind;
        Ok(Arc::new(
            IioVoltage::open(&wind.direction_raw_path, &wind.direction_scale_path).await?,
        ))
    }

    async fn rain_edges(&self) -> Result<Box<dyn EdgeSource>> {
        let rain = &self.config.rain;
        let (line, level) = GpioLineEvents::open(&rain.gpio_chip, rain.gpio_line)?;
        Ok(Box::new(DebouncedEdges::new(
            line,
            level,
            Duration::from_millis(rain.glitch_ms),
            Duration::from_millis(rain.holdoff_ms),
        )))
    }

    async fn primary_temperature(&self) -> Result<Arc<dyn TemperatureSource>> {
        Ok(Arc::new(
            HwmonTemperature::open(&self.config.atmosphere.temperature_path).await?,
        ))
    }

    async fn environment_sensor(&self) -> Result<Arc<dyn PressureHumiditySource>> {
        Ok(Arc::new(
            IioEnvironment::open(&self.config.atmosphere.environment_dir).await?,
        ))
    }

    async fn output_pin(&self, path: &str) -> Result<Arc<dyn OutputPin>> {
        Ok(Arc::new(SysfsOutputPin::open(path)?))
    }
}
