use crate::application::registry::{SchedulePolicy, ScheduleError, TimerRegistry};
use crate::domain::holiday;
use crate::domain::models::{Activation, Alarm, weekday_index};
use crate::domain::recurrence;
use crate::infrastructure::alarm_repository::AlarmRepository;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::fire_sink::FireSink;
use crate::infrastructure::wake_timer::{TimerKey, TimerKind, WakeTimer};
use chrono::{Duration, Local, NaiveDateTime};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub type NowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What became of a wake-up delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The sink was handed the event.
    Delivered,
    /// A one-shot landed on a national holiday with exclusion on; delivery
    /// was suppressed and the alarm moved to the next working day.
    SkippedHoliday,
    /// The wake-up referenced a missing or non-live alarm. Stale
    /// registrations end up here.
    Ignored,
}

#[derive(Debug)]
pub struct RestoreFailure {
    pub alarm_id: i64,
    pub error: ScheduleError,
}

/// Outcome of a whole-set re-registration. One alarm failing never stops
/// the others from being restored.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<i64>,
    pub failures: Vec<RestoreFailure>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Orchestrates alarm state transitions: persistence, wake-timer
/// registrations, and delivery hand-off move together under one write
/// guard, so a toggle and a concurrently arriving wake-up cannot interleave
/// their read-modify-write cycles.
pub struct AlarmLifecycle<R: AlarmRepository, W: WakeTimer, F: FireSink> {
    repository: Arc<R>,
    registry: TimerRegistry<W>,
    sink: Arc<F>,
    now: NowProvider,
    write_guard: Mutex<()>,
}

impl<R: AlarmRepository, W: WakeTimer, F: FireSink> AlarmLifecycle<R, W, F> {
    pub fn new(repository: Arc<R>, wake_timer: Arc<W>, sink: Arc<F>) -> Self {
        Self {
            repository,
            registry: TimerRegistry::new(wake_timer),
            sink,
            now: Arc::new(|| Local::now().naive_local()),
            write_guard: Mutex::new(()),
        }
    }

    pub fn with_now_provider(mut self, now: NowProvider) -> Self {
        self.now = now;
        self
    }

    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        let registry = self.registry;
        self.registry = registry.with_policy(policy);
        self
    }

    /// Creation-timestamp identifier, matching the persisted id space.
    pub fn allocate_id(&self) -> i64 {
        (self.now)().and_utc().timestamp_millis()
    }

    pub fn get(&self, alarm_id: i64) -> Result<Option<Alarm>, InfraError> {
        self.repository.get(alarm_id)
    }

    pub fn alarms(&self) -> Result<Vec<Alarm>, InfraError> {
        self.repository.all()
    }

    /// Validates, registers, and persists the alarm as enabled. A
    /// holiday-moved specific date is written back so the stored alarm
    /// matches its registrations.
    pub fn save(&self, mut alarm: Alarm) -> Result<Alarm, ScheduleError> {
        alarm.validate().map_err(ScheduleError::InvalidAlarm)?;
        let _guard = self.guard()?;
        let now = (self.now)();

        self.registry.cancel_all(alarm.id);
        let outcome = self.registry.schedule(&alarm, now)?;
        if let Some(moved) = outcome.moved_to {
            alarm.set_specific_date(moved.format(DATE_FORMAT).to_string());
        }
        alarm.activation = Activation::Enabled {
            scheduled_at: outcome.first_fire,
        };
        self.repository.upsert(&alarm)?;
        info!(alarm_id = alarm.id, first_fire = %outcome.first_fire, "alarm saved");
        Ok(alarm)
    }

    /// Removes the alarm and every registration it owns. Returns `false`
    /// when no such alarm existed.
    pub fn delete(&self, alarm_id: i64) -> Result<bool, ScheduleError> {
        let _guard = self.guard()?;
        self.registry.cancel_all(alarm_id);
        let removed = self.repository.delete(alarm_id)?;
        if removed {
            info!(alarm_id, "alarm deleted");
        }
        Ok(removed)
    }

    /// Toggles the alarm. Disabling a repeater precomputes the occurrence
    /// it would have fired at and parks it for the reactivate affordance;
    /// disabling anything else goes straight to `Disabled`. Unknown ids are
    /// a no-op.
    pub fn set_enabled(&self, alarm_id: i64, enabled: bool) -> Result<Option<Alarm>, ScheduleError> {
        let _guard = self.guard()?;
        let Some(mut alarm) = self.repository.get(alarm_id)? else {
            return Ok(None);
        };
        let now = (self.now)();

        self.registry.cancel_all(alarm_id);
        if enabled {
            let outcome = self.registry.schedule(&alarm, now)?;
            if let Some(moved) = outcome.moved_to {
                alarm.set_specific_date(moved.format(DATE_FORMAT).to_string());
            }
            alarm.activation = Activation::Enabled {
                scheduled_at: outcome.first_fire,
            };
        } else if alarm.is_repeating() {
            let next_fire = recurrence::first_weekly_occurrence(&alarm, now)?.ok_or_else(|| {
                ScheduleError::InvalidAlarm("repeating alarm without weekdays".to_string())
            })?;
            alarm.activation = Activation::AwaitingReactivation { next_fire };
        } else {
            alarm.activation = Activation::Disabled;
        }
        self.repository.upsert(&alarm)?;
        debug!(alarm_id, enabled, "alarm toggled");
        Ok(Some(alarm))
    }

    /// Re-arms a parked repeater for exactly the occurrence stored at
    /// disable time, without re-registering the full weekly schedule.
    pub fn reactivate(&self, alarm_id: i64) -> Result<Option<Alarm>, ScheduleError> {
        let _guard = self.guard()?;
        let Some(mut alarm) = self.repository.get(alarm_id)? else {
            return Ok(None);
        };
        let next_fire = match &alarm.activation {
            Activation::AwaitingReactivation { next_fire } => *next_fire,
            _ => return Ok(None),
        };
        let now = (self.now)();

        self.registry.register_occurrence(
            alarm_id,
            Some(weekday_index(next_fire.date())),
            next_fire,
            now,
        )?;
        alarm.activation = Activation::Reactivated { fire_at: next_fire };
        self.repository.upsert(&alarm)?;
        info!(alarm_id, fire_at = %next_fire, "alarm reactivated");
        Ok(Some(alarm))
    }

    /// "Off for today": drops today's occurrence of a repeater and arms the
    /// next selected weekday as a single reactivated occurrence. Firing it
    /// resumes the full weekly schedule.
    pub fn skip_today(&self, alarm_id: i64) -> Result<Option<Alarm>, ScheduleError> {
        let _guard = self.guard()?;
        let Some(mut alarm) = self.repository.get(alarm_id)? else {
            return Ok(None);
        };
        if !alarm.is_repeating() {
            return Ok(None);
        }
        let now = (self.now)();
        let next = recurrence::first_occurrence_skipping_today(&alarm, now)?.ok_or_else(|| {
            ScheduleError::InvalidAlarm("repeating alarm without weekdays".to_string())
        })?;

        self.registry.cancel_all(alarm_id);
        self.registry
            .register_occurrence(alarm_id, Some(weekday_index(next.date())), next, now)?;
        alarm.activation = Activation::Reactivated { fire_at: next };
        self.repository.upsert(&alarm)?;
        info!(alarm_id, fire_at = %next, "skipping today's occurrence");
        Ok(Some(alarm))
    }

    /// Registers a snooze occurrence `minutes` from now (the policy default
    /// when zero or negative). The alarm's regular registrations stay put,
    /// and its activation state is not consulted: a fired one-shot is
    /// already `Disabled` by the time the user taps snooze.
    pub fn snooze(
        &self,
        alarm_id: i64,
        minutes: i64,
    ) -> Result<Option<NaiveDateTime>, ScheduleError> {
        let _guard = self.guard()?;
        if self.repository.get(alarm_id)?.is_none() {
            return Ok(None);
        }
        let minutes = if minutes <= 0 {
            self.registry.policy().default_snooze_minutes
        } else {
            minutes
        };
        let fire_at = (self.now)() + Duration::minutes(minutes);
        self.registry.register_snooze(alarm_id, fire_at)?;
        debug!(alarm_id, %fire_at, "snooze registered");
        Ok(Some(fire_at))
    }

    /// Entry point for a wake-timer expiry. Pre-alarm keys notify without
    /// firing; main and snooze keys deliver and advance the alarm's state.
    pub fn handle_wake(&self, key: TimerKey) -> Result<FireOutcome, ScheduleError> {
        let _guard = self.guard()?;
        let Some(mut alarm) = self.repository.get(key.alarm_id)? else {
            debug!(alarm_id = key.alarm_id, "wake-up for unknown alarm ignored");
            return Ok(FireOutcome::Ignored);
        };
        // Snooze deliveries bypass the liveness gate; the alarm they
        // belong to may have gone `Disabled` when its main key fired.
        if key.kind != TimerKind::Snooze && !alarm.activation.is_live() {
            debug!(alarm_id = alarm.id, "wake-up for non-live alarm ignored");
            return Ok(FireOutcome::Ignored);
        }
        let now = (self.now)();

        if key.kind == TimerKind::PreAlarm {
            self.sink.pre_alarm_due(&alarm);
            return Ok(FireOutcome::Delivered);
        }

        // Holiday exclusion is enforced at fire time for one-shots; the
        // stored date may have been valid when it was registered.
        if key.kind == TimerKind::Main
            && !alarm.is_repeating()
            && alarm.exclude_holidays
            && holiday::is_holiday(now.date())
        {
            let replacement = recurrence::next_working_day(now.date())?;
            alarm.set_specific_date(replacement.format(DATE_FORMAT).to_string());
            let outcome = self.registry.schedule(&alarm, now)?;
            alarm.activation = Activation::Enabled {
                scheduled_at: outcome.first_fire,
            };
            self.repository.upsert(&alarm)?;
            info!(alarm_id = alarm.id, moved_to = %replacement, "holiday fire suppressed");
            return Ok(FireOutcome::SkippedHoliday);
        }

        self.sink.alarm_fired(&alarm);

        match key.kind {
            TimerKind::Snooze => {
                // One delivery per snooze; the regular schedule is untouched.
                self.registry.cancel_snooze(alarm.id);
            }
            TimerKind::Main if alarm.is_repeating() => {
                // Re-resolving at the fire instant rolls the consumed
                // weekday a week and leaves the others in place. This is
                // also how a reactivated repeater rejoins its schedule.
                let outcome = self.registry.schedule(&alarm, now)?;
                alarm.activation = Activation::Enabled {
                    scheduled_at: outcome.first_fire,
                };
                self.repository.upsert(&alarm)?;
            }
            TimerKind::Main => {
                self.registry.cancel_all(alarm.id);
                alarm.activation = Activation::Disabled;
                self.repository.upsert(&alarm)?;
            }
            TimerKind::PreAlarm => unreachable!("handled above"),
        }
        info!(alarm_id = alarm.id, kind = ?key.kind, "alarm fired");
        Ok(FireOutcome::Delivered)
    }

    /// App-start housekeeping: reactivation affordances do not survive a
    /// process restart, so parked repeaters fall back to plain `Disabled`.
    /// Returns how many were cleared.
    pub fn start_sweep(&self) -> Result<usize, ScheduleError> {
        let _guard = self.guard()?;
        let mut cleared = 0;
        for mut alarm in self.repository.all()? {
            if matches!(alarm.activation, Activation::AwaitingReactivation { .. }) {
                alarm.activation = Activation::Disabled;
                self.repository.upsert(&alarm)?;
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!(cleared, "cleared stale reactivation affordances");
        }
        Ok(cleared)
    }

    /// Re-registers every live alarm after the wake timers were lost (a
    /// device reboot). Failures are collected per alarm; the stored state
    /// is left untouched so a later attempt can retry.
    pub fn restore_all(&self) -> Result<RestoreReport, ScheduleError> {
        let _guard = self.guard()?;
        let now = (self.now)();
        let mut report = RestoreReport::default();

        for mut alarm in self.repository.all()? {
            if !alarm.activation.is_live() {
                continue;
            }
            match self.restore_one(&mut alarm, now) {
                Ok(()) => report.restored.push(alarm.id),
                Err(error) => {
                    warn!(alarm_id = alarm.id, %error, "failed to restore alarm");
                    report.failures.push(RestoreFailure {
                        alarm_id: alarm.id,
                        error,
                    });
                }
            }
        }
        info!(
            restored = report.restored.len(),
            failed = report.failures.len(),
            "restore pass finished"
        );
        Ok(report)
    }

    fn restore_one(&self, alarm: &mut Alarm, now: NaiveDateTime) -> Result<(), ScheduleError> {
        match alarm.activation {
            // A still-pending reactivated occurrence comes back as-is.
            Activation::Reactivated { fire_at } if fire_at > now => {
                self.registry.register_occurrence(
                    alarm.id,
                    Some(weekday_index(fire_at.date())),
                    fire_at,
                    now,
                )?;
            }
            _ => {
                let outcome = self.registry.schedule(alarm, now)?;
                if let Some(moved) = outcome.moved_to {
                    alarm.set_specific_date(moved.format(DATE_FORMAT).to_string());
                }
                alarm.activation = Activation::Enabled {
                    scheduled_at: outcome.first_fire,
                };
                self.repository.upsert(alarm)?;
            }
        }
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, ScheduleError> {
        self.write_guard.lock().map_err(|error| {
            ScheduleError::Storage(InfraError::Storage(format!(
                "lifecycle write guard poisoned: {error}"
            )))
        })
    }
}
