//! Owns the reminder settings and keeps the device's alarms in sync with them.

use std::sync::Arc;

use binday_core::{ConfigError, Day, NotificationOffsetConfig};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::SettingsError;
use crate::notifications::{NotificationSink, PermissionProvider, PermissionStatus};
use crate::preferences::Preferences;
use crate::scheduler::{NotificationScheduler, ScheduleReport};
use crate::tasks::{TaskOutcome, TaskRunner};

/// Task id shared by every scheduling run, so a new run always replaces the
/// one in flight.
pub const SCHEDULING_TASK_ID: &str = "notification-scheduling";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStatus {
    Idle,
    Scheduling,
}

#[derive(Debug)]
struct ControllerState {
    days: Arc<Vec<Day>>,
    config: NotificationOffsetConfig,
    permission_warning: bool,
}

/// Counts enqueued runs and publishes `Scheduling` while any is pending.
#[derive(Debug)]
struct StatusTracker {
    pending: Mutex<usize>,
    tx: watch::Sender<SchedulingStatus>,
}

impl StatusTracker {
    fn enqueue(self: &Arc<Self>) -> PendingRun {
        let mut pending = self.pending.lock();
        *pending += 1;
        self.tx.send_replace(SchedulingStatus::Scheduling);
        PendingRun {
            tracker: Arc::clone(self),
        }
    }

    fn settle(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.tx.send_replace(SchedulingStatus::Idle);
        }
    }
}

/// Dropped when a run ends for any reason, including cancellation before it
/// started.
struct PendingRun {
    tracker: Arc<StatusTracker>,
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        self.tracker.settle();
    }
}

pub struct SettingsController {
    scheduler: Arc<NotificationScheduler>,
    sink: Arc<dyn NotificationSink>,
    permissions: Arc<dyn PermissionProvider>,
    preferences: Arc<dyn Preferences>,
    runner: TaskRunner,
    state: Mutex<ControllerState>,
    status: Arc<StatusTracker>,
    last_report: Arc<Mutex<Option<ScheduleReport>>>,
}

pub struct SettingsControllerBuilder {
    sink: Option<Arc<dyn NotificationSink>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    preferences: Option<Arc<dyn Preferences>>,
    clock: Option<Arc<dyn Clock>>,
    runner: Option<TaskRunner>,
    days: Vec<Day>,
}

impl Default for SettingsControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsControllerBuilder {
    pub fn new() -> Self {
        Self {
            sink: None,
            permissions: None,
            preferences: None,
            clock: None,
            runner: None,
            days: Vec::new(),
        }
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_runner(mut self, runner: TaskRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_days(mut self, days: Vec<Day>) -> Self {
        self.days = days;
        self
    }

    /// Loads the persisted settings; unreadable settings fall back to the
    /// defaults. Does not schedule anything yet.
    pub fn build(self) -> Result<SettingsController, SettingsError> {
        let sink = self
            .sink
            .ok_or(SettingsError::MissingCollaborator("notification sink"))?;
        let permissions = self
            .permissions
            .ok_or(SettingsError::MissingCollaborator("permission provider"))?;
        let preferences = self
            .preferences
            .ok_or(SettingsError::MissingCollaborator("preferences store"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let runner = match self.runner {
            Some(runner) => runner,
            None => TaskRunner::current()?,
        };

        let config = preferences.load().unwrap_or_else(|err| {
            warn!(%err, "unable to load notification settings, using defaults");
            NotificationOffsetConfig::default()
        });
        let scheduler = NotificationScheduler::new(
            Arc::clone(&sink),
            Arc::clone(&permissions),
            clock,
        );
        let (tx, _rx) = watch::channel(SchedulingStatus::Idle);

        Ok(SettingsController {
            scheduler: Arc::new(scheduler),
            sink,
            permissions,
            preferences,
            runner,
            state: Mutex::new(ControllerState {
                days: Arc::new(self.days),
                config,
                permission_warning: false,
            }),
            status: Arc::new(StatusTracker {
                pending: Mutex::new(0),
                tx,
            }),
            last_report: Arc::new(Mutex::new(None)),
        })
    }
}

impl SettingsController {
    pub fn builder() -> SettingsControllerBuilder {
        SettingsControllerBuilder::new()
    }

    pub fn config(&self) -> NotificationOffsetConfig {
        self.state.lock().config.clone()
    }

    pub fn days(&self) -> Arc<Vec<Day>> {
        Arc::clone(&self.state.lock().days)
    }

    pub fn is_enabled(&self, offset_days: u8) -> Result<bool, SettingsError> {
        Ok(self.state.lock().config.slot(offset_days)?.enabled)
    }

    pub fn hour(&self, offset_days: u8) -> Result<u8, SettingsError> {
        Ok(self.state.lock().config.slot(offset_days)?.hour)
    }

    pub fn set_enabled(&self, offset_days: u8, enabled: bool) -> Result<(), SettingsError> {
        self.update_config(|config| config.set_enabled(offset_days, enabled))
    }

    pub fn set_hour(&self, offset_days: u8, hour: u8) -> Result<(), SettingsError> {
        self.update_config(|config| config.set_hour(offset_days, hour))
    }

    /// Replaces the collection days (e.g. after a calendar reload) and
    /// reschedules against them.
    pub fn set_days(&self, days: Vec<Day>) {
        self.state.lock().days = Arc::new(days);
        self.reschedule();
    }

    /// Starts a scheduling run with the current days and settings, replacing
    /// any run in flight.
    pub fn reschedule(&self) {
        let (days, config) = {
            let state = self.state.lock();
            (Arc::clone(&state.days), state.config.clone())
        };
        let scheduler = Arc::clone(&self.scheduler);
        let last_report = Arc::clone(&self.last_report);
        let pending = self.status.enqueue();

        self.runner.run(SCHEDULING_TASK_ID, move |cancel| async move {
            let _pending = pending;
            let report = scheduler.schedule(&days, &config, &cancel).await;
            *last_report.lock() = Some(report);
        });
    }

    /// Waits for the current scheduling run, if any, to stop.
    pub async fn settle(&self) -> Option<TaskOutcome> {
        self.runner.wait(SCHEDULING_TASK_ID).await
    }

    pub fn status(&self) -> SchedulingStatus {
        *self.status.tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SchedulingStatus> {
        self.status.tx.subscribe()
    }

    pub fn last_report(&self) -> Option<ScheduleReport> {
        self.last_report.lock().clone()
    }

    /// True once notifications were denied; the host should point the user
    /// to the system settings.
    pub fn permission_warning(&self) -> bool {
        self.state.lock().permission_warning
    }

    /// Asks the platform for notification permission and applies the answer.
    pub async fn request_permission(&self) -> bool {
        let granted = self.permissions.request().await;
        self.on_permission_result(granted).await;
        granted
    }

    /// Re-reads the permission status, e.g. when the app returns to the
    /// foreground after the user visited the system settings.
    pub async fn refresh_permission_status(&self) -> PermissionStatus {
        let status = self.permissions.query_status().await;
        match status {
            PermissionStatus::Denied => self.on_permission_result(false).await,
            PermissionStatus::Authorized if self.permission_warning() => {
                self.on_permission_result(true).await
            }
            _ => {}
        }
        status
    }

    #[instrument(skip(self))]
    pub async fn on_permission_result(&self, granted: bool) {
        if granted {
            self.state.lock().permission_warning = false;
            info!("notification permission granted");
            self.reschedule();
            return;
        }

        let snapshot = {
            let mut state = self.state.lock();
            state.config.disable_all();
            state.permission_warning = true;
            state.config.clone()
        };
        self.persist(&snapshot);
        self.runner.cancel_and_await(SCHEDULING_TASK_ID).await;
        if let Err(err) = self.sink.cancel_all().await {
            warn!(%err, "unable to clear reminders after permission denial");
        }
        info!("notification permission denied, reminders disabled");
    }

    /// Stops any scheduling run in flight.
    pub fn teardown(&self) {
        self.runner.cancel(SCHEDULING_TASK_ID);
    }

    fn update_config(
        &self,
        change: impl FnOnce(&mut NotificationOffsetConfig) -> Result<(), ConfigError>,
    ) -> Result<(), SettingsError> {
        let snapshot = {
            let mut state = self.state.lock();
            let mut next = state.config.clone();
            change(&mut next)?;
            state.config = next.clone();
            next
        };
        self.persist(&snapshot);
        self.reschedule();
        Ok(())
    }

    fn persist(&self, config: &NotificationOffsetConfig) {
        if let Err(err) = self.preferences.save(config) {
            warn!(%err, "unable to persist notification settings");
        }
    }
}
