// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch scheduler.
//!
//! A fixed-interval tick, restricted to an operational hour window, walks
//! the three message classes. Each class runs under its own non-overlap
//! state so a slow class never blocks the others and a long-running tick
//! is skipped rather than doubled. Maintenance jobs run on calendar cron
//! schedules plus a short-interval reaper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use croner::Cron;
use sendari_config::model::{DispatchConfig, RetentionConfig};
use sendari_core::types::MessageClass;
use sendari_session::SessionManager;
use sendari_storage::Database;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::maintenance;
use crate::pipeline;

/// Per-class non-overlap state.
///
/// `try_begin` is the class-scoped mutual-exclusion flag: a tick that finds
/// the previous run still in flight skips the class instead of queueing.
pub struct ClassState {
    running: AtomicBool,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
}

impl ClassState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            last_tick_at: Mutex::new(None),
        }
    }

    /// Attempt to start a run. Returns `false` if one is already running.
    pub fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Mark the run finished and record its completion time.
    pub fn finish(&self) {
        if let Ok(mut at) = self.last_tick_at.lock() {
            *at = Some(Utc::now());
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        self.last_tick_at.lock().ok().and_then(|at| *at)
    }
}

impl Default for ClassState {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `hour` falls inside the `[start, end)` operational window.
pub fn within_window(hour: u32, start: u32, end: u32) -> bool {
    (start..end).contains(&hour)
}

#[derive(Debug, Clone, Copy)]
enum Job {
    Purge,
    LifeDecrement,
    DeadlineWarnings,
}

/// Periodically converts queued `pending` messages into paced delivery
/// attempts across the currently usable sessions.
pub struct DispatchScheduler {
    db: Database,
    manager: Arc<SessionManager>,
    dispatch: DispatchConfig,
    retention: RetentionConfig,
    states: [Arc<ClassState>; 3],
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl DispatchScheduler {
    pub fn new(
        db: Database,
        manager: Arc<SessionManager>,
        dispatch: DispatchConfig,
        retention: RetentionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            manager,
            dispatch,
            retention,
            states: [
                Arc::new(ClassState::new()),
                Arc::new(ClassState::new()),
                Arc::new(ClassState::new()),
            ],
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Register all timers: the main dispatch tick, the calendar-scheduled
    /// maintenance jobs, and the reaper loop.
    pub fn init_crons(self: &Arc<Self>) {
        info!(
            tick_secs = self.dispatch.tick_interval_secs,
            window_start = self.dispatch.active_hours_start,
            window_end = self.dispatch.active_hours_end,
            "dispatch scheduler initialized"
        );

        self.spawn_dispatch_loop();
        self.spawn_cron_job("retention-purge", self.retention.purge_schedule.clone(), Job::Purge);
        self.spawn_cron_job(
            "life-decrement",
            self.retention.life_schedule.clone(),
            Job::LifeDecrement,
        );
        self.spawn_cron_job(
            "deadline-warnings",
            self.retention.warning_schedule.clone(),
            Job::DeadlineWarnings,
        );
        self.spawn_reaper_loop();
    }

    /// Cancel all timers and wait for in-flight work within the grace period.
    pub async fn stop(&self) {
        info!("stopping dispatch scheduler");
        self.cancel.cancel();
        self.tracker.close();

        let grace = Duration::from_secs(self.dispatch.shutdown_grace_secs);
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                grace_secs = self.dispatch.shutdown_grace_secs,
                "grace period elapsed with dispatch work still in flight"
            );
        }
    }

    /// Non-overlap state for one class (exposed for tests and introspection).
    pub fn class_state(&self, class: MessageClass) -> &Arc<ClassState> {
        let idx = MessageClass::ALL
            .iter()
            .position(|c| *c == class)
            .unwrap_or(0);
        &self.states[idx]
    }

    fn spawn_dispatch_loop(self: &Arc<Self>) {
        let sched = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(sched.dispatch.tick_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = sched.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                sched.tick();
            }
            debug!("dispatch loop ended");
        });
    }

    /// One scheduler tick: start an independent run for every idle class.
    fn tick(self: &Arc<Self>) {
        let hour = chrono::Local::now().hour();
        if !within_window(
            hour,
            self.dispatch.active_hours_start,
            self.dispatch.active_hours_end,
        ) {
            debug!(hour, "outside operational hours, skipping tick");
            return;
        }

        for class in MessageClass::ALL {
            let state = Arc::clone(self.class_state(class));
            if !state.try_begin() {
                debug!(class = %class, "previous tick still running, skipping class");
                continue;
            }
            let sched = Arc::clone(self);
            self.tracker.spawn(async move {
                pipeline::run_class(
                    &sched.db,
                    &sched.manager,
                    &sched.dispatch,
                    class,
                    &sched.cancel,
                )
                .await;
                state.finish();
            });
        }
    }

    fn spawn_cron_job(self: &Arc<Self>, label: &'static str, pattern: String, job: Job) {
        let cron = match <Cron as std::str::FromStr>::from_str(&pattern) {
            Ok(cron) => cron,
            Err(e) => {
                warn!(job = label, pattern = pattern.as_str(), error = %e, "invalid cron pattern, job disabled");
                return;
            }
        };

        let sched = Arc::clone(self);
        self.tracker.spawn(async move {
            loop {
                let now = chrono::Local::now();
                let next = match cron.find_next_occurrence(&now, false) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!(job = label, error = %e, "no next occurrence, job disabled");
                        break;
                    }
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = sched.cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                sched.run_job(label, job).await;
            }
            debug!(job = label, "cron job loop ended");
        });
    }

    async fn run_job(&self, label: &'static str, job: Job) {
        debug!(job = label, "maintenance job starting");
        let result = match job {
            Job::Purge => maintenance::purge_old_messages(&self.db, &self.retention).await,
            Job::LifeDecrement => maintenance::decrement_device_life(&self.db).await,
            Job::DeadlineWarnings => maintenance::send_deadline_warnings(&self.db).await,
        };
        match result {
            Ok(()) => debug!(job = label, "maintenance job finished"),
            Err(e) => warn!(job = label, error = %e, "maintenance job failed"),
        }
    }

    fn spawn_reaper_loop(self: &Arc<Self>) {
        let sched = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(
                sched.retention.reaper_interval_secs.max(1),
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // skip the immediate first fire
            loop {
                tokio::select! {
                    _ = sched.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                maintenance::run_reaper_pass(&sched.db, &sched.manager, &sched.retention).await;
            }
            debug!("reaper loop ended");
        });
    }
}
