//! Timelapse window scheduler
//!
//! Arms a deferred start action and, once it fires, a chained stop action.
//! At most one window exists; scheduling again replaces it. Cancellation is
//! transitive through an epoch counter: every deferred action re-validates
//! the epoch under the scheduler lock before doing anything, so a stop
//! action chained off an already-fired start can never outlive a cancel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::session::CameraSession;

/// A resolved start/stop window
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledWindow {
    pub start_at: DateTime<Local>,
    pub end_at: DateTime<Local>,
}

struct SchedulerInner {
    /// Bumped on every cancel/replace; stale actions compare against it
    epoch: u64,
    window: Option<ScheduledWindow>,
    handles: Vec<JoinHandle<()>>,
}

/// One-window deferred start/stop scheduler for timelapse sessions
pub struct TimelapseScheduler {
    session: Arc<CameraSession>,
    inner: Mutex<SchedulerInner>,
}

impl TimelapseScheduler {
    pub fn new(session: Arc<CameraSession>) -> Arc<Self> {
        Arc::new(Self {
            session,
            inner: Mutex::new(SchedulerInner {
                epoch: 0,
                window: None,
                handles: Vec::new(),
            }),
        })
    }

    /// Resolve `HH:MM` strings against `now` and arm the window.
    /// Replaces any pending window.
    pub async fn schedule_window(
        self: &Arc<Self>,
        start: &str,
        end: &str,
    ) -> Result<ScheduledWindow> {
        let now = Local::now();
        let window = resolve_window(start, end, now)?;

        let delay_start = (window.start_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let run_for = (window.end_at - window.start_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        self.arm(window.clone(), delay_start, run_for).await;
        tracing::info!(
            start_at = %window.start_at,
            end_at = %window.end_at,
            "Timelapse window scheduled"
        );
        Ok(window)
    }

    /// Arm a window with explicit delays. Separated from the wall-clock
    /// resolution so tests can drive it with short durations.
    pub async fn arm(self: &Arc<Self>, window: ScheduledWindow, delay_start: Duration, run_for: Duration) {
        let mut inner = self.inner.lock().await;
        cancel_locked(&mut inner);
        let epoch = inner.epoch;
        inner.window = Some(window);

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay_start).await;
            scheduler.fire_start(epoch, run_for).await;
        });
        inner.handles.push(handle);
    }

    /// Deferred start action: starts the timelapse and chains the stop
    /// action. A stale epoch means the window was cancelled between the
    /// timer firing and this lock acquisition.
    async fn fire_start(self: Arc<Self>, epoch: u64, run_for: Duration) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!("Scheduled start discarded: window cancelled");
            return;
        }

        match self.session.start_timelapse().await {
            Ok(true) => tracing::info!("Scheduled timelapse started"),
            Ok(false) => tracing::warn!("Scheduled timelapse refused: camera busy"),
            Err(e) => tracing::error!(error = %e, "Scheduled timelapse failed to start"),
        }

        // The stop is armed regardless; stop_timelapse is idempotent and
        // the window should not outlive its end time.
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(run_for).await;
            scheduler.fire_stop(epoch).await;
        });
        inner.handles.push(handle);
    }

    /// Deferred stop action, end of the window
    async fn fire_stop(self: Arc<Self>, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            tracing::debug!("Scheduled stop discarded: window cancelled");
            return;
        }

        if let Err(e) = self.session.stop_timelapse().await {
            tracing::error!(error = %e, "Scheduled timelapse failed to stop");
        } else {
            tracing::info!("Scheduled timelapse stopped");
        }
        inner.window = None;
    }

    /// Cancel every outstanding deferred action and clear the window.
    /// Safe to call when nothing is scheduled.
    pub async fn cancel_all(&self) {
        let mut inner = self.inner.lock().await;
        cancel_locked(&mut inner);
    }

    /// The pending/active window, for display
    pub async fn pending(&self) -> Option<ScheduledWindow> {
        self.inner.lock().await.window.clone()
    }
}

fn cancel_locked(inner: &mut SchedulerInner) {
    inner.epoch += 1;
    for handle in inner.handles.drain(..) {
        handle.abort();
    }
    if inner.window.take().is_some() {
        tracing::info!("Timelapse window cancelled");
    }
}

/// Resolve two `HH:MM` wall-clock strings against `now`: a start that is
/// not strictly in the future shifts to the next day, and the end shifts
/// until it lies after the start.
pub fn resolve_window(start: &str, end: &str, now: DateTime<Local>) -> Result<ScheduledWindow> {
    let start_time = parse_hhmm(start)?;
    let end_time = parse_hhmm(end)?;

    let today = now.date_naive();
    let mut start_naive = today.and_time(start_time);
    if start_naive <= now.naive_local() {
        start_naive += chrono::Duration::days(1);
    }
    let mut end_naive = today.and_time(end_time);
    while end_naive <= start_naive {
        end_naive += chrono::Duration::days(1);
    }

    let start_at = to_local(start_naive)?;
    let end_at = to_local(end_naive)?;
    Ok(ScheduledWindow { start_at, end_at })
}

fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| Error::Validation(format!("invalid time '{value}', expected HH:MM")))
}

fn to_local(naive: chrono::NaiveDateTime) -> Result<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::Validation(format!("nonexistent local time {naive}")))
}
