//! Periodic sync scheduler
//!
//! One background loop: plan the next run from the current settings, sleep
//! until it is due, then (if still enabled) refresh the hub and sync every
//! enabled spoke.
//!
//! ## Settings
//!
//! Interval and enabled flag live in a `watch` channel. A change while the
//! loop is sleeping re-plans the deadline from the start of the wait, so a
//! shorter interval can make the next run due immediately.
//!
//! ## Shutdown
//!
//! The loop stops promptly when the shutdown signal fires. A cycle already
//! in progress is given `shutdown_grace` to finish and is then dropped.
//! Stores only swap in fully written state, so dropping a cycle never
//! corrupts the cache. The store is flushed before `run` returns.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::orchestrator::{HubRefresh, SyncOrchestrator};

/// Handle for changing schedule settings at runtime
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    settings: Arc<watch::Sender<ScheduleConfig>>,
    next_run: watch::Receiver<Option<DateTime<Utc>>>,
}

impl ScheduleHandle {
    /// Current settings
    pub fn settings(&self) -> ScheduleConfig {
        *self.settings.borrow()
    }

    /// Change the interval (clamped to 1..=1440 minutes)
    pub fn set_interval_minutes(&self, minutes: u64) {
        self.settings.send_modify(|s| {
            *s = ScheduleConfig::new(minutes, s.enabled);
        });
    }

    /// Enable or disable periodic sync
    pub fn set_enabled(&self, enabled: bool) {
        self.settings.send_modify(|s| s.enabled = enabled);
    }

    /// Replace both settings at once (interval clamped to 1..=1440 minutes)
    pub fn apply(&self, settings: ScheduleConfig) {
        self.settings.send_modify(|s| {
            *s = ScheduleConfig::new(settings.interval_minutes, settings.enabled);
        });
    }

    /// When the next cycle is due; `None` while disabled or stopped
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        *self.next_run.borrow()
    }
}

/// Background timer driving the orchestrator
pub struct Scheduler {
    orchestrator: Arc<SyncOrchestrator>,
    settings: watch::Receiver<ScheduleConfig>,
    next_run: watch::Sender<Option<DateTime<Utc>>>,
    shutdown_grace: Duration,
}

impl Scheduler {
    /// Create a scheduler
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, handle)
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        settings: ScheduleConfig,
        shutdown_grace: Duration,
    ) -> (Self, ScheduleHandle) {
        let settings = ScheduleConfig::new(settings.interval_minutes, settings.enabled);
        let (settings_tx, settings_rx) = watch::channel(settings);
        let (next_tx, next_rx) = watch::channel(None);

        let scheduler = Self {
            orchestrator,
            settings: settings_rx,
            next_run: next_tx,
            shutdown_grace,
        };
        let handle = ScheduleHandle {
            settings: Arc::new(settings_tx),
            next_run: next_rx,
        };

        (scheduler, handle)
    }

    /// Run until the shutdown signal fires
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The final store flush failed
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        let initial = *self.settings.borrow();
        info!(
            "Scheduler started: every {} minutes, {}",
            initial.interval_minutes,
            if initial.enabled { "enabled" } else { "disabled" }
        );

        let mut settings_open = true;

        'outer: loop {
            let wait_started = Instant::now();

            // Sleep until due, re-planning whenever the settings change.
            loop {
                let settings = *self.settings.borrow_and_update();
                let deadline = wait_started + settings.interval();
                self.publish_next_run(settings.enabled, deadline);

                tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown signal received");
                        break 'outer;
                    }
                    changed = self.settings.changed(), if settings_open => {
                        if changed.is_err() {
                            debug!("Schedule handle dropped; keeping current settings");
                            settings_open = false;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }

            if !self.settings.borrow().enabled {
                debug!("Periodic sync disabled, skipping tick");
                continue;
            }

            let cycle = self.orchestrator.run_cycle();
            tokio::pin!(cycle);

            tokio::select! {
                report = &mut cycle => {
                    if matches!(report.hub, HubRefresh::NoHub) {
                        info!("No hub configured, scheduled sync skipped");
                    }
                }
                _ = &mut shutdown => {
                    info!(
                        "Shutdown requested during a sync cycle, waiting up to {:?}",
                        self.shutdown_grace
                    );
                    if tokio::time::timeout(self.shutdown_grace, &mut cycle).await.is_err() {
                        warn!("Sync cycle abandoned at shutdown");
                    }
                    break 'outer;
                }
            }
        }

        self.next_run.send_replace(None);

        if let Err(e) = self.orchestrator.store().flush().await {
            error!("Failed to flush store at shutdown: {}", e);
            return Err(e);
        }
        info!("Store flushed, scheduler stopped");
        Ok(())
    }

    fn publish_next_run(&self, enabled: bool, deadline: Instant) {
        let next = enabled.then(|| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            Utc::now() + chrono::Duration::from_std(remaining).unwrap_or(chrono::Duration::zero())
        });
        self.next_run.send_replace(next);
    }
}
