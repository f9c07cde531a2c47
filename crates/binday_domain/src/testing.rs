//! In-memory collaborators for tests and headless runs.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AlarmError;
use crate::notifications::{
    AlarmPrecision, NotificationRequest, NotificationSink, PermissionProvider, PermissionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    CreateChannel,
    CancelAll,
    Scheduled {
        request: NotificationRequest,
        precision: AlarmPrecision,
    },
}

/// Records every call and keeps the resulting alarm set, the way the OS would.
#[derive(Debug)]
pub struct RecordingNotificationSink {
    events: Mutex<Vec<SinkEvent>>,
    exact_available: AtomicBool,
    deny_exact: AtomicBool,
    failing_ids: Mutex<HashSet<i32>>,
    schedule_delay: Mutex<Option<Duration>>,
}

impl Default for RecordingNotificationSink {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            exact_available: AtomicBool::new(true),
            deny_exact: AtomicBool::new(false),
            failing_ids: Mutex::new(HashSet::new()),
            schedule_delay: Mutex::new(None),
        }
    }
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports exact alarms as unavailable up front.
    pub fn without_exact_alarms(self) -> Self {
        self.exact_available.store(false, Ordering::SeqCst);
        self
    }

    /// Advertises exact alarms but rejects them when scheduling.
    pub fn denying_exact_alarms(self) -> Self {
        self.deny_exact.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_for(self, id: i32) -> Self {
        self.failing_ids.lock().insert(id);
        self
    }

    /// Simulates a slow OS by sleeping inside every `schedule_at`.
    pub fn with_schedule_delay(self, delay: Duration) -> Self {
        *self.schedule_delay.lock() = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn cancel_all_count(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::CancelAll))
    }

    pub fn schedule_count(&self) -> usize {
        self.count(|event| matches!(event, SinkEvent::Scheduled { .. }))
    }

    /// Alarms that would currently be pending on the device, ordered by id.
    pub fn active(&self) -> Vec<NotificationRequest> {
        let mut active: BTreeMap<i32, NotificationRequest> = BTreeMap::new();
        for event in self.events.lock().iter() {
            match event {
                SinkEvent::CancelAll => active.clear(),
                SinkEvent::Scheduled { request, .. } => {
                    active.insert(request.id, request.clone());
                }
                SinkEvent::CreateChannel => {}
            }
        }
        active.into_values().collect()
    }

    fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn create_channel(&self) -> Result<(), AlarmError> {
        self.events.lock().push(SinkEvent::CreateChannel);
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), AlarmError> {
        self.events.lock().push(SinkEvent::CancelAll);
        Ok(())
    }

    async fn schedule_at(
        &self,
        request: &NotificationRequest,
        precision: AlarmPrecision,
    ) -> Result<(), AlarmError> {
        let delay = *self.schedule_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if precision == AlarmPrecision::Exact && self.deny_exact.load(Ordering::SeqCst) {
            return Err(AlarmError::ExactAlarmDenied);
        }
        if self.failing_ids.lock().contains(&request.id) {
            return Err(AlarmError::Backend(format!("rejected request {}", request.id)));
        }
        self.events.lock().push(SinkEvent::Scheduled {
            request: request.clone(),
            precision,
        });
        Ok(())
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_available.load(Ordering::SeqCst)
    }
}

/// Permission source with a settable status. `request` resolves to the
/// configured answer and updates the status accordingly.
#[derive(Debug)]
pub struct StaticPermissions {
    status: Mutex<PermissionStatus>,
    grant_on_request: AtomicBool,
    requests: AtomicUsize,
}

impl StaticPermissions {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Mutex::new(status),
            grant_on_request: AtomicBool::new(status == PermissionStatus::Authorized),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn authorized() -> Self {
        Self::new(PermissionStatus::Authorized)
    }

    pub fn granting_on_request(self, grant: bool) -> Self {
        self.grant_on_request.store(grant, Ordering::SeqCst);
        self
    }

    pub fn set_status(&self, status: PermissionStatus) {
        *self.status.lock() = status;
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn query_status(&self) -> PermissionStatus {
        *self.status.lock()
    }

    async fn request(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let granted = self.grant_on_request.load(Ordering::SeqCst);
        self.set_status(if granted {
            PermissionStatus::Authorized
        } else {
            PermissionStatus::Denied
        });
        granted
    }
}
