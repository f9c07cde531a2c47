pub mod clock;
pub mod error;
pub mod notifications;
pub mod preferences;
pub mod scheduler;
pub mod settings;
pub mod tasks;
pub mod testing;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::error::{AlarmError, PreferencesError, SettingsError, TaskError};
pub use crate::notifications::{
    AlarmPrecision, NotificationRequest, NotificationSink, PermissionProvider, PermissionStatus,
};
pub use crate::preferences::{InMemoryPreferences, JsonFilePreferences, Preferences};
pub use crate::scheduler::{NotificationScheduler, ScheduleOutcome, ScheduleReport};
pub use crate::settings::{SchedulingStatus, SettingsController, SettingsControllerBuilder};
pub use crate::tasks::{TaskHandle, TaskOutcome, TaskRunner};
