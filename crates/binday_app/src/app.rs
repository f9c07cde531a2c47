use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use binday_core::generate_days;
use binday_domain::{
    AlarmError, AlarmPrecision, Clock, JsonFilePreferences, NotificationRequest, NotificationSink,
    PermissionProvider, PermissionStatus, SettingsController, SystemClock,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Upcoming collection days printed on startup.
const PREVIEW_DAYS: usize = 4;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) preferences_path: PathBuf,
    pub(crate) permission: PermissionStatus,
    pub(crate) exact_alarms: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup("BINDAY_PREFERENCES") {
            if !path.trim().is_empty() {
                config.preferences_path = PathBuf::from(path.trim());
            }
        }
        if let Some(permission) = lookup("BINDAY_PERMISSION") {
            match permission.trim().to_ascii_lowercase().as_str() {
                "granted" => config.permission = PermissionStatus::Authorized,
                "denied" => config.permission = PermissionStatus::Denied,
                "undetermined" => config.permission = PermissionStatus::NotDetermined,
                other => warn!(value = other, "ignoring unknown BINDAY_PERMISSION"),
            }
        }
        if let Some(exact) = lookup("BINDAY_EXACT_ALARMS") {
            match exact.trim().parse::<bool>() {
                Ok(value) => config.exact_alarms = value,
                Err(_) => warn!(value = %exact, "ignoring unparsable BINDAY_EXACT_ALARMS"),
            }
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preferences_path: PathBuf::from("binday-preferences.json"),
            permission: PermissionStatus::Authorized,
            exact_alarms: true,
        }
    }
}

/// Headless stand-in for the platform alarm manager: keeps the pending
/// reminders in memory and logs every change.
#[derive(Debug)]
pub struct DesktopNotificationSink {
    pending: Mutex<BTreeMap<i32, NotificationRequest>>,
    exact_alarms: bool,
}

impl DesktopNotificationSink {
    pub fn new(exact_alarms: bool) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            exact_alarms,
        }
    }

    pub fn pending(&self) -> Vec<NotificationRequest> {
        self.pending.lock().values().cloned().collect()
    }
}

#[async_trait]
impl NotificationSink for DesktopNotificationSink {
    async fn create_channel(&self) -> Result<(), AlarmError> {
        debug!("notification channel ready");
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), AlarmError> {
        let mut pending = self.pending.lock();
        debug!(cleared = pending.len(), "cancelled pending reminders");
        pending.clear();
        Ok(())
    }

    async fn schedule_at(
        &self,
        request: &NotificationRequest,
        precision: AlarmPrecision,
    ) -> Result<(), AlarmError> {
        if precision == AlarmPrecision::Exact && !self.exact_alarms {
            return Err(AlarmError::ExactAlarmDenied);
        }
        debug!(
            id = request.id,
            at = %request.scheduled_for,
            ?precision,
            title = %request.title,
            "reminder queued"
        );
        self.pending.lock().insert(request.id, request.clone());
        Ok(())
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_alarms
    }
}

/// Permission answer taken from the environment. An undetermined status is
/// granted on request.
#[derive(Debug)]
pub struct EnvPermissions {
    status: Mutex<PermissionStatus>,
}

impl EnvPermissions {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }
}

#[async_trait]
impl PermissionProvider for EnvPermissions {
    async fn query_status(&self) -> PermissionStatus {
        *self.status.lock()
    }

    async fn request(&self) -> bool {
        let mut status = self.status.lock();
        if *status == PermissionStatus::NotDetermined {
            *status = PermissionStatus::Authorized;
        }
        *status == PermissionStatus::Authorized
    }
}

pub async fn run(config: AppConfig) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let days = generate_days(clock.now());
    for day in days.iter().take(PREVIEW_DAYS) {
        info!(
            date = %day.format_date("%a %d.%m.%Y"),
            bins = %day.bin_titles().join(", "),
            "upcoming collection"
        );
    }

    let sink = Arc::new(DesktopNotificationSink::new(config.exact_alarms));
    let controller = SettingsController::builder()
        .with_notification_sink(sink.clone())
        .with_permissions(Arc::new(EnvPermissions::new(config.permission)))
        .with_preferences(Arc::new(JsonFilePreferences::new(&config.preferences_path)))
        .with_clock(clock)
        .with_days(days)
        .build()
        .context("unable to set up reminder settings")?;

    if config.permission == PermissionStatus::NotDetermined {
        controller.request_permission().await;
    } else {
        controller.refresh_permission_status().await;
    }
    if controller.permission_warning() {
        warn!("notifications are blocked, enable them in the system settings");
    }

    controller.reschedule();
    controller.settle().await;

    let Some(report) = controller.last_report() else {
        bail!("scheduling run ended without a report");
    };
    info!(
        outcome = ?report.outcome,
        scheduled = report.scheduled,
        skipped_past = report.skipped_past,
        failed = report.failed,
        inexact = report.inexact,
        pending = sink.pending().len(),
        preferences = %config.preferences_path.display(),
        "reminders synchronised"
    );
    controller.teardown();
    Ok(())
}
