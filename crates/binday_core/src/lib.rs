pub mod bins;
pub mod calendar;
pub mod config;
pub mod day;

pub use crate::bins::BinKind;
pub use crate::calendar::{generate_days, generate_days_with_exceptions};
pub use crate::config::{ConfigError, NotificationOffsetConfig, OffsetSlot};
pub use crate::day::Day;
