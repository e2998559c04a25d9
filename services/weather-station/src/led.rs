//! Indicator LEDs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::io::OutputPin;

const FLASH_DURATION: Duration = Duration::from_millis(100);
const MAX_FLICKER_PULSES: u32 = 100;

/// An LED on a digital output.
///
/// Clones share the pin and state.
#[derive(Clone)]
pub struct Led {
    name: String,
    pin: Arc<dyn OutputPin>,
    on: Arc<AtomicBool>,
    busy: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Led {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Led")
            .field("name", &self.name)
            .field("on", &self.is_on())
            .finish()
    }
}

impl Led {
    pub fn new(name: impl Into<String>, pin: Arc<dyn OutputPin>) -> Self {
        Self {
            name: name.into(),
            pin,
            on: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on(&self) {
        self.on.store(true, Ordering::SeqCst);
        self.drive(true);
    }

    pub fn off(&self) {
        self.on.store(false, Ordering::SeqCst);
        self.drive(false);
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    /// Briefly invert the LED without blocking the caller.
    ///
    /// A request that arrives while another flash is running is dropped.
    pub fn flash(&self) {
        let guard = match Arc::clone(&self.busy).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("LED '{}' busy, dropping flash", self.name);
                return;
            }
        };

        let led = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let resting = led.is_on();
            led.drive(!resting);
            tokio::time::sleep(FLASH_DURATION).await;
            led.drive(resting);
        });
    }

    /// Blink `pulses` times, waiting for any running flash first.
    ///
    /// Requests outside 1..=100 pulses are ignored.
    pub async fn flicker(&self, pulses: u32) {
        if pulses == 0 || pulses > MAX_FLICKER_PULSES {
            return;
        }
        let _guard = self.busy.lock().await;
        for _ in 0..pulses {
            self.drive(true);
            tokio::time::sleep(FLASH_DURATION).await;
            self.drive(false);
            tokio::time::sleep(FLASH_DURATION).await;
        }
        self.drive(self.is_on());
    }

    fn drive(&self, high: bool) {
        if let Err(e) = self.pin.set_level(high) {
            warn!("Failed to drive LED '{}': {}", self.name, e);
        }
    }
}

/// Flash `led` every `interval` until cancelled
pub async fn heartbeat(led: Led, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => led.flash(),
            _ = cancel.cancelled() => {
                debug!("Heartbeat for '{}' cancelled", led.name());
                led.off();
                break;
            }
        }
    }
}
