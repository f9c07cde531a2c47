use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::{bins::BinKind, day::Day};

/// Weekday on which the regular collection happens.
pub const COLLECTION_WEEKDAY: Weekday = Weekday::Wed;

/// Number of weeks generated after the anchor week (53 regular days in total).
pub const WEEKS_AHEAD: u64 = 52;

/// Extra bulky-waste pickups announced by the municipality, as (year, month, day).
pub const HEAVY_LOAD_DATES: &[(i32, u32, u32)] = &[
    (2025, 3, 21),
    (2025, 9, 26),
    (2026, 3, 20),
    (2026, 9, 25),
    (2027, 3, 19),
];

pub fn heavy_load_dates() -> Vec<NaiveDate> {
    HEAVY_LOAD_DATES
        .iter()
        .filter_map(|&(year, month, day)| {
            let date = NaiveDate::from_ymd_opt(year, month, day);
            if date.is_none() {
                tracing::warn!(year, month, day, "ignoring invalid heavy-load date");
            }
            date
        })
        .collect()
}

/// Generates the collection calendar starting at the current or next Wednesday,
/// including the built-in heavy-load pickups that are still ahead of `now`.
pub fn generate_days(now: NaiveDateTime) -> Vec<Day> {
    generate_days_with_exceptions(now, &heavy_load_dates())
}

pub fn generate_days_with_exceptions(now: NaiveDateTime, exceptions: &[NaiveDate]) -> Vec<Day> {
    let Some(anchor) = anchor_date(now.date()) else {
        tracing::warn!(%now, "unable to compute collection anchor");
        return Vec::new();
    };

    let mut days: Vec<Day> = Vec::with_capacity(WEEKS_AHEAD as usize + 1 + exceptions.len());
    for week in 0..=WEEKS_AHEAD {
        let Some(date) = anchor.checked_add_days(Days::new(week * 7)) else {
            tracing::warn!(%anchor, week, "skipping collection day outside the calendar range");
            continue;
        };
        days.push(Day::at_start_of(date, regular_bins(date)));
    }

    for &date in exceptions {
        if date.and_time(NaiveTime::MIN) <= now {
            continue;
        }
        match days.iter_mut().find(|day| day.calendar_date() == date) {
            Some(existing) => existing.push_bin(BinKind::HeavyLoad),
            None => days.push(Day::at_start_of(date, vec![BinKind::HeavyLoad])),
        }
    }

    days.sort();
    days
}

/// Today when it is a collection day, otherwise the next collection weekday.
pub fn anchor_date(today: NaiveDate) -> Option<NaiveDate> {
    let target = COLLECTION_WEEKDAY.number_from_monday();
    let current = today.weekday().number_from_monday();
    let ahead = (target + 7 - current) % 7;
    today.checked_add_days(Days::new(u64::from(ahead)))
}

/// Bins collected on a regular day, alternating by ISO-8601 week parity.
pub fn regular_bins(date: NaiveDate) -> Vec<BinKind> {
    if date.iso_week().week() % 2 == 0 {
        vec![BinKind::Paper, BinKind::Bio, BinKind::Mix]
    } else {
        vec![BinKind::Plastic, BinKind::Mix]
    }
}
