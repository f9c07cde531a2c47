use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AlarmError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub scheduled_for: DateTime<Utc>,
}

/// How strictly the OS should honour the trigger time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlarmPrecision {
    Exact,
    /// Best-effort delivery, allowed to fire while the device idles.
    Inexact,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionStatus {
    Authorized,
    Denied,
    NotDetermined,
}

/// Platform-specific notification adapters will implement this trait.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Registers the notification channel. Must be idempotent.
    async fn create_channel(&self) -> Result<(), AlarmError>;
    async fn cancel_all(&self) -> Result<(), AlarmError>;
    async fn schedule_at(
        &self,
        request: &NotificationRequest,
        precision: AlarmPrecision,
    ) -> Result<(), AlarmError>;
    fn can_schedule_exact(&self) -> bool;
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn query_status(&self) -> PermissionStatus;
    /// Prompts the user when the platform still allows it and reports whether
    /// notifications are granted afterwards.
    async fn request(&self) -> bool;
}
