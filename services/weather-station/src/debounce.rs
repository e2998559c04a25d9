//! Software debounce for the rain gauge reed switch
//!
//! The switch idles high and pulls low for each bucket tip. Contact bounce and
//! induced noise show up as very short level changes, and a single tip can
//! close the switch more than once as the bucket settles.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::io::{EdgeSource, LevelEvents};

#[derive(Debug, Clone)]
pub struct EdgeDebouncer {
    glitch: Duration,
    holdoff: Duration,
    stable_level: bool,
    candidate: Option<(bool, Instant)>,
    last_edge: Option<Instant>,
}

impl EdgeDebouncer {
    /// `glitch`: minimum time a new level must persist before it counts.
    /// `holdoff`: minimum spacing between two accepted falling edges.
    ///
    /// The input is assumed to rest high.
    pub fn new(glitch: Duration, holdoff: Duration) -> Self {
        Self::with_level(glitch, holdoff, true)
    }

    /// Debouncer whose settled level is `level`, as read from the input at
    /// start-up.
    pub fn with_level(glitch: Duration, holdoff: Duration, level: bool) -> Self {
        Self {
            glitch,
            holdoff,
            stable_level: level,
            candidate: None,
            last_edge: None,
        }
    }

    pub fn stable_level(&self) -> bool {
        self.stable_level
    }

    /// When the pending level change will have lasted the glitch time, if one
    /// is pending.
    pub fn settle_deadline(&self) -> Option<Instant> {
        self.candidate.map(|(_, since)| since + self.glitch)
    }

    /// Feed a raw level observed at `now`.
    ///
    /// Returns `true` exactly once per accepted falling edge.
    pub fn update(&mut self, level: bool, now: Instant) -> bool {
        if level == self.stable_level {
            self.candidate = None;
            return false;
        }

        let since = match self.candidate {
            Some((candidate, since)) if candidate == level => since,
            _ => {
                self.candidate = Some((level, now));
                now
            }
        };

        if now.duration_since(since) < self.glitch {
            return false;
        }

        self.stable_level = level;
        self.candidate = None;

        if level {
            return false;
        }

        if let Some(previous) = self.last_edge {
            if now.duration_since(previous) < self.holdoff {
                return false;
            }
        }
        self.last_edge = Some(now);
        true
    }
}

/// Turns raw level changes into debounced bucket tips.
///
/// Waits on the input's change events. While a change is pending it waits at
/// most until the glitch time has run out, so the input is never polled.
pub struct DebouncedEdges<L> {
    input: L,
    level: bool,
    debouncer: EdgeDebouncer,
}

impl<L: LevelEvents> DebouncedEdges<L> {
    /// `level` is the input level at the time `input` was opened
    pub fn new(input: L, level: bool, glitch: Duration, holdoff: Duration) -> Self {
        Self {
            input,
            level,
            debouncer: EdgeDebouncer::with_level(glitch, holdoff, level),
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

#[async_trait]
impl<L: LevelEvents> EdgeSource for DebouncedEdges<L> {
    async fn wait_for_edge(&mut self) -> Result<()> {
        loop {
            match self.debouncer.settle_deadline() {
                Some(deadline) => {
                    let deadline = tokio::time::Instant::from_std(deadline);
                    if let Ok(level) =
                        tokio::time::timeout_at(deadline, self.input.next_level()).await
                    {
                        self.level = level?;
                    }
                }
                None => self.level = self.input.next_level().await?,
            }

            if self.debouncer.update(self.level, now()) {
                debug!("Debounced rain gauge edge");
                return Ok(());
            }
        }
    }
}
