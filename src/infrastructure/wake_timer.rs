use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Main,
    PreAlarm,
    Snooze,
}

/// Identity of one wake-timer registration. A structured key, so two
/// registrations can never collide the way hashed string request codes can.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    pub alarm_id: i64,
    pub kind: TimerKind,
    pub weekday: Option<u8>,
}

impl TimerKey {
    pub fn main(alarm_id: i64, weekday: Option<u8>) -> Self {
        Self {
            alarm_id,
            kind: TimerKind::Main,
            weekday,
        }
    }

    pub fn pre_alarm(alarm_id: i64, weekday: Option<u8>) -> Self {
        Self {
            alarm_id,
            kind: TimerKind::PreAlarm,
            weekday,
        }
    }

    pub fn snooze(alarm_id: i64) -> Self {
        Self {
            alarm_id,
            kind: TimerKind::Snooze,
            weekday: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("exact wake-up scheduling permission denied")]
pub struct PermissionDenied;

/// External wake-timer capability. Registering an already-registered key
/// replaces the previous registration; cancel of an absent key is a no-op.
pub trait WakeTimer: Send + Sync {
    fn can_schedule_exact(&self) -> bool;
    fn register(&self, key: TimerKey, fire_at: NaiveDateTime) -> Result<(), PermissionDenied>;
    fn cancel(&self, key: &TimerKey);
}

/// In-memory wake timer recording registrations by key. Stands in for the
/// platform timer in tests and embedding experiments. Every map operation
/// is a single insert or remove, so a poisoned lock is recovered rather
/// than propagated.
#[derive(Debug)]
pub struct InMemoryWakeTimer {
    registrations: Mutex<BTreeMap<TimerKey, NaiveDateTime>>,
    exact_allowed: AtomicBool,
}

impl Default for InMemoryWakeTimer {
    fn default() -> Self {
        Self {
            registrations: Mutex::new(BTreeMap::new()),
            exact_allowed: AtomicBool::new(true),
        }
    }
}

impl InMemoryWakeTimer {
    pub fn deny_exact(&self) {
        self.exact_allowed.store(false, Ordering::SeqCst);
    }

    pub fn allow_exact(&self) {
        self.exact_allowed.store(true, Ordering::SeqCst);
    }

    pub fn registered(&self, key: &TimerKey) -> Option<NaiveDateTime> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn registrations(&self) -> BTreeMap<TimerKey, NaiveDateTime> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn registrations_for(&self, alarm_id: i64) -> BTreeMap<TimerKey, NaiveDateTime> {
        self.registrations()
            .into_iter()
            .filter(|(key, _)| key.alarm_id == alarm_id)
            .collect()
    }
}

impl WakeTimer for InMemoryWakeTimer {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn register(&self, key: TimerKey, fire_at: NaiveDateTime) -> Result<(), PermissionDenied> {
        if !self.can_schedule_exact() {
            return Err(PermissionDenied);
        }
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, fire_at);
        Ok(())
    }

    fn cancel(&self, key: &TimerKey) {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
