use binday_core::ConfigError;
use thiserror::Error;

/// Failures reported by a platform notification adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    #[error("exact alarms are not permitted on this device")]
    ExactAlarmDenied,
    #[error("notification permission was revoked")]
    PermissionDenied,
    #[error("alarm backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("preferences I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task runner requires a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("settings controller is missing its {0}")]
    MissingCollaborator(&'static str),
}
