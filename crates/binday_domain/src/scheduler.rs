//! Turns collection days and reminder slots into OS alarms.
//!
//! Every run starts from a clean slate: the channel is ensured, all alarms
//! are cancelled, and only then is the permission/config gate evaluated.
//! Identical inputs therefore always leave the same alarm set behind.

use std::sync::Arc;

use binday_core::{Day, NotificationOffsetConfig, OffsetSlot};
use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::error::AlarmError;
use crate::notifications::{
    AlarmPrecision, NotificationRequest, NotificationSink, PermissionProvider, PermissionStatus,
};

/// Minute past the configured hour at which reminders fire.
pub const TRIGGER_MINUTE: u32 = 25;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Completed,
    /// No reminder slot is enabled.
    Disabled,
    PermissionNotGranted,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub outcome: ScheduleOutcome,
    pub scheduled: usize,
    pub skipped_past: usize,
    pub failed: usize,
    pub inexact: usize,
}

impl ScheduleReport {
    fn new() -> Self {
        Self {
            outcome: ScheduleOutcome::Completed,
            scheduled: 0,
            skipped_past: 0,
            failed: 0,
            inexact: 0,
        }
    }

    fn finish(mut self, outcome: ScheduleOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Requests planned for a single day.
#[derive(Debug, Default)]
struct DayPlan {
    requests: Vec<NotificationRequest>,
    skipped_past: usize,
    unresolved: usize,
}

pub struct NotificationScheduler {
    sink: Arc<dyn NotificationSink>,
    permissions: Arc<dyn PermissionProvider>,
    clock: Arc<dyn Clock>,
}

impl NotificationScheduler {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        permissions: Arc<dyn PermissionProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            permissions,
            clock,
        }
    }

    /// Replaces every pending alarm with the reminders derived from `days`
    /// and `config`. Stops before the next day once `cancel` fires; alarms
    /// already handed over stay until the next run clears them.
    #[instrument(skip_all, fields(days = days.len()))]
    pub async fn schedule(
        &self,
        days: &[Day],
        config: &NotificationOffsetConfig,
        cancel: &CancellationToken,
    ) -> ScheduleReport {
        let now = self.clock.now();
        let mut report = ScheduleReport::new();

        if let Err(err) = self.sink.create_channel().await {
            warn!(%err, "unable to prepare notification channel");
        }
        if let Err(err) = self.sink.cancel_all().await {
            warn!(%err, "unable to clear previously scheduled reminders");
        }

        let status = self.permissions.query_status().await;
        if status != PermissionStatus::Authorized {
            info!(?status, "notifications not authorized, nothing scheduled");
            return report.finish(ScheduleOutcome::PermissionNotGranted);
        }
        if config.is_disabled() {
            info!("all reminder slots disabled, nothing scheduled");
            return report.finish(ScheduleOutcome::Disabled);
        }

        let exact_available = self.sink.can_schedule_exact();
        if !exact_available {
            warn!("exact alarms unavailable, falling back to inexact delivery");
        }

        for day in days {
            if cancel.is_cancelled() {
                info!(
                    scheduled = report.scheduled,
                    "scheduling run cancelled before completion"
                );
                return report.finish(ScheduleOutcome::Canceled);
            }

            let plan = plan_day(day, config, now, self.clock.as_ref());
            report.skipped_past += plan.skipped_past;
            report.failed += plan.unresolved;
            for request in &plan.requests {
                self.dispatch(request, exact_available, &mut report).await;
            }
        }

        info!(
            scheduled = report.scheduled,
            skipped_past = report.skipped_past,
            failed = report.failed,
            inexact = report.inexact,
            "scheduling run completed"
        );
        report
    }

    /// The requests a run would schedule right now, without touching the sink.
    pub fn plan(
        &self,
        days: &[Day],
        config: &NotificationOffsetConfig,
    ) -> Vec<NotificationRequest> {
        build_requests(days, config, self.clock.now(), self.clock.as_ref())
    }

    async fn dispatch(
        &self,
        request: &NotificationRequest,
        exact_available: bool,
        report: &mut ScheduleReport,
    ) {
        let precision = if exact_available {
            AlarmPrecision::Exact
        } else {
            AlarmPrecision::Inexact
        };

        let result = match self.sink.schedule_at(request, precision).await {
            Err(AlarmError::ExactAlarmDenied) if precision == AlarmPrecision::Exact => {
                warn!(id = request.id, "exact alarm denied, retrying as inexact");
                self.sink
                    .schedule_at(request, AlarmPrecision::Inexact)
                    .await
                    .map(|()| AlarmPrecision::Inexact)
            }
            other => other.map(|()| precision),
        };

        match result {
            Ok(used) => {
                report.scheduled += 1;
                if used == AlarmPrecision::Inexact {
                    report.inexact += 1;
                }
                debug!(
                    id = request.id,
                    scheduled_for = %request.scheduled_for,
                    ?used,
                    "reminder scheduled"
                );
            }
            Err(err) => {
                report.failed += 1;
                warn!(id = request.id, %err, "failed to schedule reminder");
            }
        }
    }
}

/// Pure planning step: every future reminder for `days` under `config`,
/// relative to the local wall-clock time `now`.
pub fn build_requests(
    days: &[Day],
    config: &NotificationOffsetConfig,
    now: NaiveDateTime,
    clock: &dyn Clock,
) -> Vec<NotificationRequest> {
    days.iter()
        .flat_map(|day| plan_day(day, config, now, clock).requests)
        .collect()
}

fn plan_day(
    day: &Day,
    config: &NotificationOffsetConfig,
    now: NaiveDateTime,
    clock: &dyn Clock,
) -> DayPlan {
    let mut plan = DayPlan::default();
    for slot in config.enabled_slots() {
        let Some(trigger) = trigger_time(day, slot) else {
            warn!(date = %day.date, offset_days = slot.offset_days, "trigger time out of range");
            plan.unresolved += 1;
            continue;
        };
        if trigger <= now {
            plan.skipped_past += 1;
            continue;
        }
        let Some(scheduled_for) = clock.resolve(trigger) else {
            warn!(%trigger, "trigger time does not exist locally, skipping");
            plan.unresolved += 1;
            continue;
        };
        let Some(id) = request_id(day, slot.offset_days) else {
            warn!(date = %day.date, "reminder id out of range");
            plan.unresolved += 1;
            continue;
        };
        plan.requests.push(build_request(id, day, slot.offset_days, scheduled_for));
    }
    plan
}

/// Local time a reminder fires: `offset_days` before the collection day at
/// the slot's hour and [`TRIGGER_MINUTE`].
pub fn trigger_time(day: &Day, slot: &OffsetSlot) -> Option<NaiveDateTime> {
    let date = day
        .calendar_date()
        .checked_sub_days(Days::new(u64::from(slot.offset_days)))?;
    let time = NaiveTime::from_hms_opt(u32::from(slot.hour), TRIGGER_MINUTE, 0)?;
    Some(date.and_time(time))
}

/// Stable id: days since the Unix epoch of the collection date, times ten,
/// plus the offset. Unique for offsets 0-9 and identical across runs.
pub fn request_id(day: &Day, offset_days: u8) -> Option<i32> {
    let epoch_secs = day
        .calendar_date()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp();
    let epoch_days = epoch_secs.div_euclid(SECONDS_PER_DAY);
    i32::try_from(epoch_days * 10 + i64::from(offset_days)).ok()
}

/// Title and lead line for a reminder sent `offset_days` ahead.
pub fn reminder_copy(offset_days: u8) -> (&'static str, &'static str) {
    match offset_days {
        0 => ("Trash pickup today", "Put these bins out this morning:"),
        1 => ("Trash pickup tomorrow", "Put these bins out tonight:"),
        2 => ("Trash pickup in two days", "Coming up the day after tomorrow:"),
        _ => ("Trash pickup in three days", "Coming up in three days:"),
    }
}

fn build_request(
    id: i32,
    day: &Day,
    offset_days: u8,
    scheduled_for: DateTime<Utc>,
) -> NotificationRequest {
    let (title, lead) = reminder_copy(offset_days);
    let body = format!("{}\n{}", lead, day.bin_titles().join("\n"));
    NotificationRequest {
        id,
        title: title.to_string(),
        body,
        scheduled_for,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::testing::{RecordingNotificationSink, SinkEvent, StaticPermissions};
    use binday_core::{generate_days_with_exceptions, BinKind};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn at(year: i32, month: u32, day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn wednesday_jan_8() -> Day {
        Day::at_start_of(
            NaiveDate::from_ymd_opt(2025, 1, 8).unwrap(),
            vec![BinKind::Paper, BinKind::Bio, BinKind::Mix],
        )
    }

    struct Fixture {
        sink: Arc<RecordingNotificationSink>,
        permissions: Arc<StaticPermissions>,
        scheduler: NotificationScheduler,
    }

    fn fixture(sink: RecordingNotificationSink, now: NaiveDateTime) -> Fixture {
        let sink = Arc::new(sink);
        let permissions = Arc::new(StaticPermissions::authorized());
        let scheduler = NotificationScheduler::new(
            sink.clone(),
            permissions.clone(),
            Arc::new(FixedClock::new(now)),
        );
        Fixture {
            sink,
            permissions,
            scheduler,
        }
    }

    fn same_day_at(hour: u8) -> NotificationOffsetConfig {
        NotificationOffsetConfig::default()
            .with_slot(0, true, hour)
            .unwrap()
    }

    #[tokio::test]
    async fn schedules_concrete_same_day_reminder() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 6, 10, 0));
        let report = fx
            .scheduler
            .schedule(&[wednesday_jan_8()], &same_day_at(8), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, ScheduleOutcome::Completed);
        assert_eq!(report.scheduled, 1);
        let active = fx.sink.active();
        assert_eq!(active.len(), 1);
        let request = &active[0];
        assert_eq!(request.id, 200_960);
        assert_eq!(request.scheduled_for.naive_utc(), at(2025, 1, 8, 8, 25));
        assert_eq!(request.title, "Trash pickup today");
        assert!(request.body.ends_with("Paper\nOrganic waste\nResidual waste"));
    }

    #[tokio::test]
    async fn disabled_config_only_cancels() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 6, 10, 0));
        let days = generate_days_with_exceptions(at(2025, 1, 6, 10, 0), &[]);
        let report = fx
            .scheduler
            .schedule(&days, &NotificationOffsetConfig::default(), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, ScheduleOutcome::Disabled);
        assert_eq!(fx.sink.cancel_all_count(), 1);
        assert_eq!(fx.sink.schedule_count(), 0);
    }

    #[tokio::test]
    async fn missing_permission_cancels_before_stopping() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 6, 10, 0));
        fx.permissions.set_status(PermissionStatus::NotDetermined);
        let report = fx
            .scheduler
            .schedule(&[wednesday_jan_8()], &same_day_at(8), &CancellationToken::new())
            .await;

        assert_eq!(report.outcome, ScheduleOutcome::PermissionNotGranted);
        assert_eq!(
            fx.sink.events(),
            vec![SinkEvent::CreateChannel, SinkEvent::CancelAll]
        );
    }

    #[tokio::test]
    async fn past_triggers_are_dropped_silently() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 8, 9, 0));
        let past_day = Day::at_start_of(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            vec![BinKind::Plastic, BinKind::Mix],
        );
        let config = same_day_at(8).with_slot(1, true, 19).unwrap();
        let report = fx
            .scheduler
            .schedule(&[past_day, wednesday_jan_8()], &config, &CancellationToken::new())
            .await;

        // Jan 1 (both slots) and Jan 8 at 08:25 are behind `now`; Jan 7 19:25 too.
        assert_eq!(report.outcome, ScheduleOutcome::Completed);
        assert_eq!(report.skipped_past, 4);
        assert_eq!(report.scheduled, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(fx.sink.schedule_count(), 0);
    }

    #[tokio::test]
    async fn same_day_reminder_later_today_is_kept() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 8, 9, 0));
        let report = fx
            .scheduler
            .schedule(&[wednesday_jan_8()], &same_day_at(10), &CancellationToken::new())
            .await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(
            fx.sink.active()[0].scheduled_for.naive_utc(),
            at(2025, 1, 8, 10, 25)
        );
    }

    #[tokio::test]
    async fn repeated_runs_leave_identical_alarm_set() {
        let now = at(2025, 1, 6, 10, 0);
        let fx = fixture(RecordingNotificationSink::new(), now);
        let days = generate_days_with_exceptions(now, &[]);
        let config = NotificationOffsetConfig::default()
            .with_slot(1, true, 19)
            .unwrap()
            .with_slot(3, true, 18)
            .unwrap();
        // The three-day reminder for Jan 8 (Jan 5 18:25) is already past.

        fx.scheduler
            .schedule(&days, &config, &CancellationToken::new())
            .await;
        let first = fx.sink.active();
        let first_calls = (fx.sink.cancel_all_count(), fx.sink.schedule_count());

        fx.scheduler
            .schedule(&days, &config, &CancellationToken::new())
            .await;
        let second = fx.sink.active();

        assert_eq!(first_calls, (1, 105));
        assert_eq!(fx.sink.cancel_all_count(), 2);
        assert_eq!(fx.sink.schedule_count(), 210);
        assert_eq!(first, second);
        let ids: BTreeSet<i32> = first.iter().map(|request| request.id).collect();
        assert_eq!(ids.len(), 105);
    }

    #[tokio::test]
    async fn cancel_all_precedes_every_schedule_call() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 6, 10, 0));
        let days = generate_days_with_exceptions(at(2025, 1, 6, 10, 0), &[]);
        fx.scheduler
            .schedule(&days, &same_day_at(6), &CancellationToken::new())
            .await;
        let events = fx.sink.events();
        assert_eq!(events[0], SinkEvent::CreateChannel);
        assert_eq!(events[1], SinkEvent::CancelAll);
        assert!(events[2..]
            .iter()
            .all(|event| matches!(event, SinkEvent::Scheduled { .. })));
    }

    #[tokio::test]
    async fn falls_back_to_inexact_when_exact_unavailable() {
        let fx = fixture(
            RecordingNotificationSink::new().without_exact_alarms(),
            at(2025, 1, 6, 10, 0),
        );
        let report = fx
            .scheduler
            .schedule(&[wednesday_jan_8()], &same_day_at(8), &CancellationToken::new())
            .await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.inexact, 1);
        assert!(matches!(
            fx.sink.events().last(),
            Some(SinkEvent::Scheduled {
                precision: AlarmPrecision::Inexact,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn retries_inexact_when_exact_is_rejected() {
        let fx = fixture(
            RecordingNotificationSink::new().denying_exact_alarms(),
            at(2025, 1, 6, 10, 0),
        );
        let report = fx
            .scheduler
            .schedule(&[wednesday_jan_8()], &same_day_at(8), &CancellationToken::new())
            .await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.inexact, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn single_failure_does_not_abort_run() {
        let now = at(2025, 1, 6, 10, 0);
        let days = generate_days_with_exceptions(now, &[]);
        let failing = request_id(&days[3], 0).unwrap();
        let fx = fixture(RecordingNotificationSink::new().failing_for(failing), now);

        let report = fx
            .scheduler
            .schedule(&days, &same_day_at(6), &CancellationToken::new())
            .await;
        assert_eq!(report.outcome, ScheduleOutcome::Completed);
        assert_eq!(report.failed, 1);
        assert_eq!(report.scheduled, 52);
        assert!(fx.sink.active().iter().all(|request| request.id != failing));
    }

    #[tokio::test]
    async fn cancelled_run_stops_after_cleanup() {
        let fx = fixture(RecordingNotificationSink::new(), at(2025, 1, 6, 10, 0));
        let days = generate_days_with_exceptions(at(2025, 1, 6, 10, 0), &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fx.scheduler.schedule(&days, &same_day_at(6), &cancel).await;
        assert_eq!(report.outcome, ScheduleOutcome::Canceled);
        assert_eq!(fx.sink.cancel_all_count(), 1);
        assert_eq!(fx.sink.schedule_count(), 0);
    }

    #[test]
    fn copy_table_and_ids_per_offset() {
        assert_eq!(reminder_copy(0).0, "Trash pickup today");
        assert_eq!(reminder_copy(1).0, "Trash pickup tomorrow");
        assert_eq!(reminder_copy(2).0, "Trash pickup in two days");
        assert_eq!(reminder_copy(3).0, "Trash pickup in three days");

        let day = wednesday_jan_8();
        let ids: BTreeSet<i32> = (0..4).filter_map(|offset| request_id(&day, offset)).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(request_id(&day, 2), Some(200_962));
    }

    #[test]
    fn trigger_time_moves_back_by_offset() {
        let slot = OffsetSlot {
            offset_days: 3,
            enabled: true,
            hour: 18,
        };
        assert_eq!(
            trigger_time(&wednesday_jan_8(), &slot),
            Some(at(2025, 1, 5, 18, 25))
        );
    }

    #[test]
    fn plan_matches_schedule_inputs() {
        let now = at(2025, 1, 6, 10, 0);
        let fx = fixture(RecordingNotificationSink::new(), now);
        let config = same_day_at(8).with_slot(2, true, 20).unwrap();
        let planned = fx.scheduler.plan(&[wednesday_jan_8()], &config);
        // Jan 6 20:25 (two days ahead) and Jan 8 08:25 are both in the future.
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[1].title, "Trash pickup in two days");
    }
}
