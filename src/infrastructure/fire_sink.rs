use crate::domain::models::Alarm;
use std::sync::{Mutex, PoisonError};

/// Ringer/notification collaborator. The engine hands over the alarm and
/// moves on; delivery rendering is entirely the sink's business.
pub trait FireSink: Send + Sync {
    fn alarm_fired(&self, alarm: &Alarm);
    /// Advance notice shortly before the main occurrence, notification-only.
    fn pre_alarm_due(&self, alarm: &Alarm);
}

/// Records delivered events for assertions.
#[derive(Debug, Default)]
pub struct CollectingFireSink {
    fired: Mutex<Vec<i64>>,
    pre_alarms: Mutex<Vec<i64>>,
}

impl CollectingFireSink {
    pub fn fired_ids(&self) -> Vec<i64> {
        self.fired.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn pre_alarm_ids(&self) -> Vec<i64> {
        self.pre_alarms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FireSink for CollectingFireSink {
    fn alarm_fired(&self, alarm: &Alarm) {
        self.fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alarm.id);
    }

    fn pre_alarm_due(&self, alarm: &Alarm) {
        self.pre_alarms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alarm.id);
    }
}
