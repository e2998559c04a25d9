//! Weather Station
//!
//! Environmental telemetry service. Samples an anemometer, a wind vane, a
//! tipping-bucket rain gauge and temperature/pressure/humidity sensors, keeps
//! rolling statistics for each, and periodically composes observations that
//! are served over HTTP and handed to report sinks.

pub mod anemometer;
pub mod atmosphere;
pub mod cascade;
pub mod compass;
pub mod config;
pub mod debounce;
pub mod error;
pub mod io;
pub mod led;
pub mod linux;
pub mod log_sink;
pub mod metrics;
#[cfg(feature = "mock")]
pub mod mock;
pub mod physics;
pub mod rainmeter;
pub mod report;
pub mod ring;
pub mod state;
pub mod stats;
pub mod status;
pub mod wow;

pub use anemometer::{Anemometer, AnemometerSettings};
pub use atmosphere::Atmosphere;
pub use cascade::{Cascade, CascadeBuilder, Statistic, TierId};
pub use config::{load_config, Config};
pub use error::{Result, StationError};
pub use io::HardwareFactory;
pub use rainmeter::{RainSettings, Rainmeter};
pub use report::{ReportSink, Reporter, Snapshot};
pub use stats::{RawData, RingStatBuffer, Stats};

#[cfg(feature = "mock")]
pub use mock::SimulatedHardware;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::atmosphere::EnvironmentTemperature;
use crate::io::{EdgeSource, HttpClient, ReqwestHttpClient, TemperatureSource};
use crate::led::Led;
use crate::linux::LinuxHardware;
use crate::log_sink::LogSink;
use crate::metrics::GaugeRegistry;
use crate::state::StateHandle;
use crate::wow::WowSink;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for a [`Station`].
///
/// Opens the hardware through a [`HardwareFactory`] and wires each enabled
/// pipeline into the reporter. A pipeline whose hardware cannot be opened is
/// logged and left out; the rest of the station still runs.
pub struct StationBuilder {
    config: Config,
    factory: Option<Arc<dyn HardwareFactory>>,
    http: Option<Arc<dyn HttpClient>>,
    sinks: Vec<Arc<dyn ReportSink>>,
    cancel: Option<CancellationToken>,
}

impl StationBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            factory: None,
            http: None,
            sinks: Vec::new(),
            cancel: None,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn HardwareFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Add a sink alongside the ones named in the configuration
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn build(self) -> Result<Station> {
        self.config.validate()?;

        let config = self.config;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(LinuxHardware::new(config.clone())));
        let state = state::new_state_handle(config.reporting.history_size);
        let gauges = Arc::new(GaugeRegistry::new());

        let mut reporter = Reporter::new(&config.reporting, Arc::clone(&state), Utc::now())
            .with_metrics(Arc::clone(&gauges) as Arc<dyn metrics::MetricsSink>);

        let wind = if config.wind.enabled {
            build_wind(&config, factory.as_ref()).await
        } else {
            info!("Wind pipeline disabled");
            None
        };
        if let Some(wind) = &wind {
            reporter = reporter.with_wind(Arc::clone(wind));
        }

        let rain = if config.rain.enabled {
            build_rain(&config, factory.as_ref()).await?
        } else {
            info!("Rain pipeline disabled");
            None
        };
        if let Some((rain, _)) = &rain {
            reporter = reporter.with_rain(Arc::clone(rain));
        }

        if config.atmosphere.enabled {
            if let Some(atmosphere) = build_atmosphere(factory.as_ref()).await {
                reporter = reporter.with_atmosphere(atmosphere, config.atmosphere.altitude_m);
            }
        } else {
            info!("Atmosphere pipeline disabled");
        }

        let heartbeat = match &config.heartbeat.led_path {
            Some(path) => open_led(factory.as_ref(), "heartbeat", path).await,
            None => None,
        };

        reporter = reporter.with_sink(Arc::new(LogSink::new()));
        if let Some(wow) = config.reporting.wow.as_ref().filter(|w| w.enabled) {
            let http = match self.http {
                Some(http) => http,
                None => Arc::new(ReqwestHttpClient::new(HTTP_TIMEOUT)?),
            };
            let sink = WowSink::new(wow, &config.reporting.software_type, http)?;
            info!("WOW upload enabled for site {}", wow.site_id);
            reporter = reporter.with_sink(Arc::new(sink));
        }
        for sink in self.sinks {
            reporter = reporter.with_sink(sink);
        }
        debug!("Report sinks: {:?}", reporter.sink_names());

        Ok(Station {
            config,
            reporter: Arc::new(reporter),
            wind,
            rain,
            heartbeat,
            state,
            gauges,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

async fn build_wind(config: &Config, factory: &dyn HardwareFactory) -> Option<Arc<Anemometer>> {
    let counter = match factory.pulse_counter().await {
        Ok(counter) => counter,
        Err(e) => {
            error!("Failed to open anemometer: {}. Continuing without wind.", e);
            return None;
        }
    };
    let vane = match factory.direction_sensor().await {
        Ok(vane) => vane,
        Err(e) => {
            error!("Failed to open wind vane: {}. Continuing without wind.", e);
            return None;
        }
    };

    let settings = AnemometerSettings::from(&config.wind);
    info!(
        "Wind pipeline: {} samples/s, {:.3} mph per tick",
        settings.samples_per_second, settings.mph_per_tick
    );
    Some(Arc::new(Anemometer::new(settings, counter, vane)))
}

type RainPipeline = (Arc<Rainmeter>, Box<dyn EdgeSource>);

async fn build_rain(
    config: &Config,
    factory: &dyn HardwareFactory,
) -> Result<Option<RainPipeline>> {
    let edges = match factory.rain_edges().await {
        Ok(edges) => edges,
        Err(e) => {
            error!("Failed to open rain gauge: {}. Continuing without rain.", e);
            return Ok(None);
        }
    };

    let led = match &config.rain.led_path {
        Some(path) => open_led(factory, "rain", path).await,
        None => None,
    };

    let rain = Rainmeter::new(RainSettings::from(&config.rain), led)?;
    info!("Rain pipeline: {} mm per tip", config.rain.mm_per_tip);
    Ok(Some((Arc::new(rain), edges)))
}

async fn build_atmosphere(factory: &dyn HardwareFactory) -> Option<Arc<Atmosphere>> {
    let mut temperature: Vec<Arc<dyn TemperatureSource>> = Vec::new();

    match factory.primary_temperature().await {
        Ok(primary) => {
            info!("Primary temperature sensor: {}", primary.name());
            temperature.push(primary);
        }
        Err(e) => warn!("Primary temperature sensor unavailable: {}", e),
    }

    let environment = match factory.environment_sensor().await {
        Ok(sensor) => {
            temperature.push(Arc::new(EnvironmentTemperature::new(Arc::clone(&sensor))));
            Some(sensor)
        }
        Err(e) => {
            warn!("Pressure/humidity sensor unavailable: {}", e);
            None
        }
    };

    if temperature.is_empty() && environment.is_none() {
        error!("No atmosphere sensors found. Continuing without atmosphere.");
        return None;
    }
    Some(Arc::new(Atmosphere::new(temperature, environment)))
}

async fn open_led(factory: &dyn HardwareFactory, name: &str, path: &str) -> Option<Led> {
    match factory.output_pin(path).await {
        Ok(pin) => Some(Led::new(name, pin)),
        Err(e) => {
            warn!("Failed to open {} LED at {}: {}", name, path, e);
            None
        }
    }
}

/// A wired station, ready to run
pub struct Station {
    config: Config,
    reporter: Arc<Reporter>,
    wind: Option<Arc<Anemometer>>,
    rain: Option<RainPipeline>,
    heartbeat: Option<Led>,
    state: StateHandle,
    gauges: Arc<GaugeRegistry>,
    cancel: CancellationToken,
}

impl Station {
    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn wind(&self) -> Option<&Arc<Anemometer>> {
        self.wind.as_ref()
    }

    pub fn rain(&self) -> Option<&Arc<Rainmeter>> {
        self.rain.as_ref().map(|(rain, _)| rain)
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn gauges(&self) -> &Arc<GaugeRegistry> {
        &self.gauges
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every loop until Ctrl-C or the cancellation token fires
    pub async fn run(self) -> Result<()> {
        let cancel = self.cancel;
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let cancel_for_signal = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                Err(e) => error!("Failed to listen for ctrl-c: {}", e),
            }
        });

        if let Some(wind) = self.wind {
            tasks.push(tokio::spawn(wind.run(cancel.clone())));
        }

        if let Some((rain, edges)) = self.rain {
            let edge_rain = Arc::clone(&rain);
            let edge_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                edge_rain.run_edges(edges, edge_cancel).await
            }));

            let tick_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { rain.run_ticks(tick_cancel).await }));
        }

        if let Some(led) = self.heartbeat {
            let interval = Duration::from_secs(self.config.heartbeat.interval_seconds.max(1));
            tasks.push(tokio::spawn(led::heartbeat(led, interval, cancel.clone())));
        }

        tasks.push(tokio::spawn(Arc::clone(&self.reporter).run(cancel.clone())));

        if self.config.server.enabled {
            let port = self.config.server.port;
            let router = status::build_router(Arc::clone(&self.state), Arc::clone(&self.gauges));
            let cancel_for_server = cancel.clone();

            tasks.push(tokio::spawn(async move {
                let addr = SocketAddr::from(([0, 0, 0, 0], port));
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(l) => l,
                    Err(e) => {
                        error!(
                            "Failed to bind status server to port {}: {}. Continuing without it.",
                            port, e
                        );
                        return;
                    }
                };
                info!("Status server listening on http://{}", addr);

                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        cancel_for_server.cancelled().await;
                    })
                    .await
                    .ok();

                debug!("Status server stopped");
            }));
        }

        info!("Weather station started ({} tasks)", tasks.len());

        for task in tasks {
            if let Err(e) = task.await {
                error!("Station task failed: {}", e);
            }
        }

        info!("Weather station stopped");
        Ok(())
    }
}
