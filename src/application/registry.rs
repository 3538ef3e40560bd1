use crate::domain::models::Alarm;
use crate::domain::recurrence::{self, Resolution, ResolveError};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::wake_timer::{PermissionDenied, TimerKey, WakeTimer};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid alarm: {0}")]
    InvalidAlarm(String),
    #[error(transparent)]
    PermissionDenied(#[from] PermissionDenied),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Storage(#[from] InfraError),
}

/// Tunable scheduling knobs with the product defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub pre_alarm_lead_minutes: i64,
    pub default_snooze_minutes: i64,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            pre_alarm_lead_minutes: 15,
            default_snooze_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub first_fire: NaiveDateTime,
    /// Replacement date chosen by the holiday skip, to be persisted by the
    /// caller.
    pub moved_to: Option<NaiveDate>,
}

/// Translates scheduling intents into wake-timer registrations, one per
/// [`TimerKey`]. Weekly repeaters hold one main registration per selected
/// weekday so a single weekday can be cancelled or refreshed without
/// touching the others; every main registration gets a companion pre-alarm.
pub struct TimerRegistry<W: WakeTimer> {
    wake_timer: Arc<W>,
    policy: SchedulePolicy,
}

impl<W: WakeTimer> TimerRegistry<W> {
    pub fn new(wake_timer: Arc<W>) -> Self {
        Self {
            wake_timer,
            policy: SchedulePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// Resolves the alarm against `now` and registers every resulting
    /// occurrence. Nothing is registered when permission is missing.
    pub fn schedule(
        &self,
        alarm: &Alarm,
        now: NaiveDateTime,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        self.ensure_permission()?;
        match recurrence::resolve(alarm, now)? {
            Resolution::Weekly(occurrences) => {
                let mut first: Option<NaiveDateTime> = None;
                for occurrence in &occurrences {
                    self.wake_timer.register(
                        TimerKey::main(alarm.id, Some(occurrence.weekday)),
                        occurrence.fire_at,
                    )?;
                    self.register_pre_alarm(
                        alarm.id,
                        Some(occurrence.weekday),
                        occurrence.fire_at,
                        now,
                    )?;
                    first = Some(first.map_or(occurrence.fire_at, |value| {
                        value.min(occurrence.fire_at)
                    }));
                }
                let first_fire = first.ok_or_else(|| {
                    ScheduleError::InvalidAlarm("weekly alarm without weekdays".to_string())
                })?;
                debug!(alarm_id = alarm.id, %first_fire, "registered weekly occurrences");
                Ok(ScheduleOutcome {
                    first_fire,
                    moved_to: None,
                })
            }
            Resolution::Single { fire_at, moved_to } => {
                self.wake_timer
                    .register(TimerKey::main(alarm.id, None), fire_at)?;
                self.register_pre_alarm(alarm.id, None, fire_at, now)?;
                debug!(alarm_id = alarm.id, %fire_at, "registered single occurrence");
                Ok(ScheduleOutcome { first_fire: fire_at, moved_to })
            }
        }
    }

    /// One main registration (plus pre-alarm) at an explicit instant, used
    /// by reactivation and the per-weekday refresh after a repeater fires.
    pub fn register_occurrence(
        &self,
        alarm_id: i64,
        weekday: Option<u8>,
        fire_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<(), ScheduleError> {
        self.ensure_permission()?;
        self.wake_timer
            .register(TimerKey::main(alarm_id, weekday), fire_at)?;
        self.register_pre_alarm(alarm_id, weekday, fire_at, now)
    }

    /// Snooze registrations live under their own key and never replace the
    /// alarm's regular registrations.
    pub fn register_snooze(
        &self,
        alarm_id: i64,
        fire_at: NaiveDateTime,
    ) -> Result<(), ScheduleError> {
        self.ensure_permission()?;
        self.wake_timer
            .register(TimerKey::snooze(alarm_id), fire_at)?;
        Ok(())
    }

    /// Cancels every registration the alarm could own. Absent keys cancel
    /// as no-ops, so this is safe to call unconditionally.
    pub fn cancel_all(&self, alarm_id: i64) {
        for weekday in std::iter::once(None).chain((0u8..7).map(Some)) {
            self.wake_timer.cancel(&TimerKey::main(alarm_id, weekday));
            self.wake_timer
                .cancel(&TimerKey::pre_alarm(alarm_id, weekday));
        }
        self.wake_timer.cancel(&TimerKey::snooze(alarm_id));
    }

    pub fn cancel_snooze(&self, alarm_id: i64) {
        self.wake_timer.cancel(&TimerKey::snooze(alarm_id));
    }

    pub fn cancel_pre_alarm(&self, alarm_id: i64, weekday: Option<u8>) {
        self.wake_timer
            .cancel(&TimerKey::pre_alarm(alarm_id, weekday));
    }

    fn ensure_permission(&self) -> Result<(), ScheduleError> {
        if !self.wake_timer.can_schedule_exact() {
            return Err(ScheduleError::PermissionDenied(PermissionDenied));
        }
        Ok(())
    }

    fn register_pre_alarm(
        &self,
        alarm_id: i64,
        weekday: Option<u8>,
        fire_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<(), ScheduleError> {
        if fire_at <= now {
            return Ok(());
        }
        let mut pre_at = fire_at - Duration::minutes(self.policy.pre_alarm_lead_minutes);
        if pre_at <= now {
            // Under the lead time already; fire the notice almost
            // immediately instead of dropping it.
            pre_at = now + Duration::seconds(1);
        }
        self.wake_timer
            .register(TimerKey::pre_alarm(alarm_id, weekday), pre_at)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::wake_timer::InMemoryWakeTimer;
    use std::collections::BTreeSet;

    fn fixed_time(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").expect("valid datetime")
    }

    fn weekly_alarm(id: i64, hour: u8, minute: u8, days: &[u8]) -> Alarm {
        let mut alarm = Alarm::new(id, hour, minute);
        alarm.set_repeat_days(days.iter().copied().collect::<BTreeSet<u8>>());
        alarm
    }

    fn registry() -> (Arc<InMemoryWakeTimer>, TimerRegistry<InMemoryWakeTimer>) {
        let timer = Arc::new(InMemoryWakeTimer::default());
        let registry = TimerRegistry::new(Arc::clone(&timer));
        (timer, registry)
    }

    #[test]
    fn weekly_schedule_registers_main_and_pre_alarm_per_weekday() {
        let (timer, registry) = registry();
        let alarm = weekly_alarm(1, 6, 0, &[1, 3, 5]);
        let now = fixed_time("2024-06-11T10:00:00");

        let outcome = registry.schedule(&alarm, now).expect("schedule");
        assert_eq!(outcome.first_fire, fixed_time("2024-06-12T06:00:00"));
        assert_eq!(outcome.moved_to, None);

        assert_eq!(timer.registrations_for(1).len(), 6);
        assert_eq!(
            timer.registered(&TimerKey::main(1, Some(3))),
            Some(fixed_time("2024-06-12T06:00:00"))
        );
        assert_eq!(
            timer.registered(&TimerKey::pre_alarm(1, Some(3))),
            Some(fixed_time("2024-06-12T05:45:00"))
        );
        assert_eq!(
            timer.registered(&TimerKey::main(1, Some(1))),
            Some(fixed_time("2024-06-17T06:00:00"))
        );
    }

    #[test]
    fn pre_alarm_clamps_when_the_main_fire_is_under_the_lead() {
        let (timer, registry) = registry();
        let now = fixed_time("2024-06-12T05:50:00");

        registry
            .register_occurrence(1, None, fixed_time("2024-06-12T06:00:00"), now)
            .expect("register");

        assert_eq!(
            timer.registered(&TimerKey::pre_alarm(1, None)),
            Some(fixed_time("2024-06-12T05:50:01"))
        );
    }

    #[test]
    fn no_pre_alarm_for_an_already_passed_instant() {
        let (timer, registry) = registry();
        let now = fixed_time("2024-06-12T07:00:00");

        registry
            .register_occurrence(1, None, fixed_time("2024-06-12T06:00:00"), now)
            .expect("register");

        assert!(timer.registered(&TimerKey::pre_alarm(1, None)).is_none());
    }

    #[test]
    fn cancel_all_is_idempotent_and_complete() {
        let (timer, registry) = registry();
        let alarm = weekly_alarm(1, 6, 0, &[1, 3, 5]);
        let now = fixed_time("2024-06-11T10:00:00");
        registry.schedule(&alarm, now).expect("schedule");
        registry
            .register_snooze(1, now + Duration::minutes(5))
            .expect("snooze");

        registry.cancel_all(1);
        assert!(timer.registrations_for(1).is_empty());

        registry.cancel_all(1);
        assert!(timer.registrations_for(1).is_empty());
    }

    #[test]
    fn snooze_does_not_replace_main_registrations() {
        let (timer, registry) = registry();
        let alarm = weekly_alarm(1, 6, 0, &[3]);
        let now = fixed_time("2024-06-11T10:00:00");
        registry.schedule(&alarm, now).expect("schedule");

        registry
            .register_snooze(1, fixed_time("2024-06-11T10:05:00"))
            .expect("snooze");

        assert_eq!(
            timer.registered(&TimerKey::main(1, Some(3))),
            Some(fixed_time("2024-06-12T06:00:00"))
        );
        assert_eq!(
            timer.registered(&TimerKey::snooze(1)),
            Some(fixed_time("2024-06-11T10:05:00"))
        );
    }

    #[test]
    fn missing_permission_fails_before_any_registration() {
        let (timer, registry) = registry();
        timer.deny_exact();
        let alarm = weekly_alarm(1, 6, 0, &[1, 3, 5]);

        let result = registry.schedule(&alarm, fixed_time("2024-06-11T10:00:00"));
        assert!(matches!(result, Err(ScheduleError::PermissionDenied(_))));
        assert!(timer.registrations_for(1).is_empty());
    }
}
