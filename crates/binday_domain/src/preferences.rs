use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use binday_core::NotificationOffsetConfig;
use parking_lot::Mutex;

use crate::error::PreferencesError;

/// Key-value persistence for the reminder settings. Saves always carry the
/// whole table so stored state is never half-updated.
pub trait Preferences: Send + Sync {
    fn load(&self) -> Result<NotificationOffsetConfig, PreferencesError>;
    fn save(&self, config: &NotificationOffsetConfig) -> Result<(), PreferencesError>;
}

/// Stores the settings as pretty-printed JSON. A missing file reads as the
/// default config.
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
    path: PathBuf,
}

impl JsonFilePreferences {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Preferences for JsonFilePreferences {
    fn load(&self) -> Result<NotificationOffsetConfig, PreferencesError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(NotificationOffsetConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Ok(NotificationOffsetConfig::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, config: &NotificationOffsetConfig) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = config.to_json()?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload)?;
        fs::rename(&staging, &self.path)?;
        tracing::debug!(path = %self.path.display(), "notification settings saved");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    stored: Mutex<Option<NotificationOffsetConfig>>,
    saves: AtomicUsize,
}

impl InMemoryPreferences {
    pub fn with_config(config: NotificationOffsetConfig) -> Self {
        Self {
            stored: Mutex::new(Some(config)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<NotificationOffsetConfig> {
        self.stored.lock().clone()
    }
}

impl Preferences for InMemoryPreferences {
    fn load(&self) -> Result<NotificationOffsetConfig, PreferencesError> {
        Ok(self.stored.lock().clone().unwrap_or_default())
    }

    fn save(&self, config: &NotificationOffsetConfig) -> Result<(), PreferencesError> {
        *self.stored.lock() = Some(config.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
