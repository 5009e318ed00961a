//! Timeout sweeping
//!
//! Containers do not run timers. A [`TimeoutMonitor`] remembers every
//! container with a finite timeout and, on each [`sweep`](TimeoutMonitor::sweep),
//! asks them to check their outstanding phase against their scope's clock.
//! Sweeps are driven externally, or by [`TimeoutMonitor::spawn`] with the
//! `tokio` feature.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "tokio")]
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::container::{ManagedContainer, Shared};
use crate::error::Error;

/// Configuration for the background sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SweepConfig {
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }
}

impl SweepConfig {
    /// Validate sweep configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval.is_zero() {
            return Err(Error::configuration(
                "sweep interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Containers checked
    pub checked: usize,
    /// Containers failed by this sweep
    pub timed_out: usize,
    /// Containers no longer watched after this sweep
    pub pruned: usize,
}

/// Registry of containers whose phases can time out.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct TimeoutMonitor {
    watched: Arc<DashMap<Uuid, Weak<Shared>>>,
}

impl TimeoutMonitor {
    /// Create an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `container` until it reaches a terminal phase or is dropped.
    pub fn watch(&self, container: &ManagedContainer) {
        self.watched.insert(container.id(), container.downgrade());
    }

    /// Number of containers watched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    /// Whether nothing is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Check every watched container once.
    ///
    /// Sweeping a terminal container is a no-op; it is dropped from the
    /// watch list.
    pub fn sweep(&self) -> SweepReport {
        // Snapshot first: container checks must not run under a shard lock.
        let entries: Vec<(Uuid, Weak<Shared>)> = self
            .watched
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut report = SweepReport::default();
        for (id, weak) in entries {
            let Some(container) = ManagedContainer::upgrade(&weak) else {
                self.watched.remove(&id);
                report.pruned += 1;
                continue;
            };
            report.checked += 1;
            if container.check_timeout() {
                report.timed_out += 1;
            }
            if container.phase().is_terminal() {
                self.watched.remove(&id);
                report.pruned += 1;
            }
        }

        if report.timed_out > 0 {
            tracing::info!(
                checked = report.checked,
                timed_out = report.timed_out,
                "Timeout sweep failed containers"
            );
        }
        report
    }

    /// Sweep every `config.interval` until `cancel` fires.
    #[cfg(feature = "tokio")]
    pub fn spawn(
        &self,
        config: SweepConfig,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, Error> {
        config.validate()?;
        let monitor = self.clone();
        Ok(tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    () = cancel.cancelled() => break,
                }
                monitor.sweep();
            }
            tracing::debug!("Timeout sweeper stopped");
        }))
    }
}
