use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Day offsets a reminder can be configured for: same day up to three days ahead.
pub const OFFSETS: [u8; 4] = [0, 1, 2, 3];

pub const MAX_HOUR: u8 = 23;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown reminder offset {0} (expected 0-3 days)")]
    UnknownOffset(u8),
    #[error("hour {0} is out of range (expected 0-23)")]
    InvalidHour(u8),
    #[error("malformed notification config: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OffsetSlot {
    pub offset_days: u8,
    pub enabled: bool,
    pub hour: u8,
}

impl OffsetSlot {
    fn disabled(offset_days: u8) -> Self {
        let hour = if offset_days == 0 { 7 } else { 19 };
        Self {
            offset_days,
            enabled: false,
            hour,
        }
    }
}

/// Reminder settings as a fixed table with one slot per offset in [`OFFSETS`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationOffsetConfig {
    slots: [OffsetSlot; 4],
}

impl Default for NotificationOffsetConfig {
    fn default() -> Self {
        Self {
            slots: OFFSETS.map(OffsetSlot::disabled),
        }
    }
}

impl NotificationOffsetConfig {
    pub fn slots(&self) -> &[OffsetSlot; 4] {
        &self.slots
    }

    pub fn slot(&self, offset_days: u8) -> Result<&OffsetSlot, ConfigError> {
        self.slots
            .get(usize::from(offset_days))
            .ok_or(ConfigError::UnknownOffset(offset_days))
    }

    fn slot_mut(&mut self, offset_days: u8) -> Result<&mut OffsetSlot, ConfigError> {
        self.slots
            .get_mut(usize::from(offset_days))
            .ok_or(ConfigError::UnknownOffset(offset_days))
    }

    pub fn enabled_slots(&self) -> impl Iterator<Item = &OffsetSlot> {
        self.slots.iter().filter(|slot| slot.enabled)
    }

    /// True when no slot is enabled, i.e. nothing would ever be scheduled.
    pub fn is_disabled(&self) -> bool {
        self.enabled_slots().next().is_none()
    }

    pub fn set_enabled(&mut self, offset_days: u8, enabled: bool) -> Result<(), ConfigError> {
        self.slot_mut(offset_days)?.enabled = enabled;
        Ok(())
    }

    pub fn set_hour(&mut self, offset_days: u8, hour: u8) -> Result<(), ConfigError> {
        if hour > MAX_HOUR {
            return Err(ConfigError::InvalidHour(hour));
        }
        self.slot_mut(offset_days)?.hour = hour;
        Ok(())
    }

    pub fn with_slot(
        mut self,
        offset_days: u8,
        enabled: bool,
        hour: u8,
    ) -> Result<Self, ConfigError> {
        self.set_hour(offset_days, hour)?;
        self.set_enabled(offset_days, enabled)?;
        Ok(self)
    }

    pub fn disable_all(&mut self) {
        for slot in &mut self.slots {
            slot.enabled = false;
        }
    }

    /// Repairs a table read from storage: slot offsets are re-derived from
    /// their position and hours are clamped to [`MAX_HOUR`].
    pub fn sanitized(mut self) -> Self {
        for (slot, offset) in self.slots.iter_mut().zip(OFFSETS) {
            slot.offset_days = offset;
            slot.hour = slot.hour.min(MAX_HOUR);
        }
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str::<Self>(raw)
            .map(Self::sanitized)
            .map_err(|err| ConfigError::Malformed(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigError::Malformed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_all_offsets_disabled() {
        let config = NotificationOffsetConfig::default();
        assert!(config.is_disabled());
        let offsets: Vec<u8> = config.slots().iter().map(|slot| slot.offset_days).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
        assert_eq!(config.slot(0).unwrap().hour, 7);
        assert_eq!(config.slot(3).unwrap().hour, 19);
    }

    #[test]
    fn rejects_unknown_offsets_and_hours() {
        let mut config = NotificationOffsetConfig::default();
        assert_eq!(config.set_enabled(4, true), Err(ConfigError::UnknownOffset(4)));
        assert_eq!(config.set_hour(1, 24), Err(ConfigError::InvalidHour(24)));
        assert!(config.set_hour(1, 23).is_ok());
        assert_eq!(config.slot(1).unwrap().hour, 23);
    }

    #[test]
    fn enabled_slots_iterate_in_offset_order() {
        let config = NotificationOffsetConfig::default()
            .with_slot(2, true, 18)
            .unwrap()
            .with_slot(0, true, 6)
            .unwrap();
        let enabled: Vec<(u8, u8)> = config
            .enabled_slots()
            .map(|slot| (slot.offset_days, slot.hour))
            .collect();
        assert_eq!(enabled, vec![(0, 6), (2, 18)]);
        assert!(!config.is_disabled());
    }

    #[test]
    fn json_load_repairs_hand_edited_values() {
        let raw = r#"{"slots":[
            {"offset_days":0,"enabled":true,"hour":8},
            {"offset_days":9,"enabled":false,"hour":40},
            {"offset_days":2,"enabled":false,"hour":19},
            {"offset_days":3,"enabled":true,"hour":20}
        ]}"#;
        let config = NotificationOffsetConfig::from_json(raw).unwrap();
        let second = config.slot(1).unwrap();
        assert_eq!(second.offset_days, 1);
        assert_eq!(second.hour, 23);
        assert_eq!(config.enabled_slots().count(), 2);

        let encoded = config.to_json().unwrap();
        assert_eq!(NotificationOffsetConfig::from_json(&encoded).unwrap(), config);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = NotificationOffsetConfig::from_json("{\"slots\": 3}").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }
}
