use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::bins::BinKind;

/// A single collection day. `date` sits at local midnight for generated days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Day {
    pub date: NaiveDateTime,
    pub bins: Vec<BinKind>,
}

impl Day {
    pub fn new(date: NaiveDateTime, bins: Vec<BinKind>) -> Self {
        Self { date, bins }
    }

    /// Builds a day at start-of-day for the given calendar date.
    pub fn at_start_of(date: NaiveDate, bins: Vec<BinKind>) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN), bins)
    }

    pub fn calendar_date(&self) -> NaiveDate {
        self.date.date()
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn bin_titles(&self) -> Vec<&'static str> {
        self.bins.iter().map(|bin| bin.title()).collect()
    }

    pub fn has_bin(&self, bin: BinKind) -> bool {
        self.bins.contains(&bin)
    }

    /// Adds a bin while keeping the set free of duplicates.
    pub fn push_bin(&mut self, bin: BinKind) {
        if !self.bins.contains(&bin) {
            self.bins.push(bin);
        }
    }

    /// Formats the date with a strftime-style pattern, e.g. `"%a, %d.%m.%Y"`.
    pub fn format_date(&self, pattern: &str) -> String {
        self.date.format(pattern).to_string()
    }
}

impl PartialOrd for Day {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Day {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.bins.cmp(&other.bins))
    }
}
