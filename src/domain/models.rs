use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Activation state of an alarm. A single closed enum instead of loose
/// booleans, so "reactivated but disabled" and similar combinations cannot
/// be represented at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Activation {
    Disabled,
    /// Registrations are live; `scheduled_at` is the earliest instant most
    /// recently handed to the wake timer.
    Enabled { scheduled_at: NaiveDateTime },
    /// Disabled by an explicit user toggle. `next_fire` is the instant the
    /// alarm would have fired, precomputed for the reactivate affordance.
    AwaitingReactivation { next_fire: NaiveDateTime },
    /// Re-enabled for exactly one occurrence at the stored instant, without
    /// a full weekly re-registration.
    Reactivated { fire_at: NaiveDateTime },
}

impl Activation {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Enabled { .. } | Self::Reactivated { .. })
    }

    /// The pending occurrence associated with the current state, if any.
    pub fn pending_fire(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Disabled => None,
            Self::Enabled { scheduled_at } => Some(*scheduled_at),
            Self::AwaitingReactivation { next_fire } => Some(*next_fire),
            Self::Reactivated { fire_at } => Some(*fire_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alarm {
    pub id: i64,
    pub hour: u8,
    pub minute: u8,
    pub label: String,
    /// Web page opened when the alarm rings; empty means none. Carried to
    /// the fire sink untouched. Absent in older persisted payloads.
    #[serde(default)]
    pub url: String,
    pub repeat_days: BTreeSet<u8>,
    pub specific_date: String,
    pub exclude_holidays: bool,
    pub vibrate: bool,
    pub activation: Activation,
}

impl Alarm {
    pub fn new(id: i64, hour: u8, minute: u8) -> Self {
        Self {
            id,
            hour,
            minute,
            label: String::new(),
            url: String::new(),
            repeat_days: BTreeSet::new(),
            specific_date: String::new(),
            exclude_holidays: false,
            vibrate: true,
            activation: Activation::Disabled,
        }
    }

    /// Selecting repeat weekdays clears any specific date; the two
    /// recurrence kinds are mutually exclusive.
    pub fn set_repeat_days(&mut self, days: BTreeSet<u8>) {
        if !days.is_empty() {
            self.specific_date.clear();
        }
        self.repeat_days = days;
    }

    /// Selecting a specific date clears any repeat weekdays.
    pub fn set_specific_date(&mut self, date: impl Into<String>) {
        let date = date.into();
        if !date.is_empty() {
            self.repeat_days.clear();
        }
        self.specific_date = date;
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat_days.is_empty()
    }

    pub fn has_specific_date(&self) -> bool {
        !self.specific_date.is_empty()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.hour > 23 {
            return Err("alarm.hour must be 0..=23".to_string());
        }
        if self.minute > 59 {
            return Err("alarm.minute must be 0..=59".to_string());
        }
        if self.repeat_days.iter().any(|day| *day > 6) {
            return Err("alarm.repeat_days entries must be 0..=6 (0 = Sunday)".to_string());
        }
        if !self.repeat_days.is_empty() && !self.specific_date.is_empty() {
            return Err(
                "alarm.repeat_days and alarm.specific_date are mutually exclusive".to_string(),
            );
        }
        if !self.specific_date.is_empty() {
            validate_date(&self.specific_date, "alarm.specific_date")?;
        }
        Ok(())
    }
}

/// Weekday index as persisted: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").expect("valid datetime")
    }

    fn sample_alarm() -> Alarm {
        let mut alarm = Alarm::new(1_700_000_000_000, 6, 30);
        alarm.label = "Morning run".to_string();
        alarm.url = "https://example.com/news".to_string();
        alarm.set_repeat_days(BTreeSet::from([1, 3, 5]));
        alarm.activation = Activation::Enabled {
            scheduled_at: fixed_time("2026-02-16T06:30:00"),
        };
        alarm
    }

    #[test]
    fn validate_accepts_weekly_alarm() {
        assert!(sample_alarm().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_time() {
        let mut alarm = sample_alarm();
        alarm.hour = 24;
        assert!(alarm.validate().is_err());

        let mut alarm = sample_alarm();
        alarm.minute = 60;
        assert!(alarm.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_weekday_index() {
        let mut alarm = sample_alarm();
        alarm.repeat_days.insert(7);
        assert!(alarm.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_specific_date() {
        let mut alarm = Alarm::new(2, 7, 0);
        alarm.set_specific_date("2024/01/01");
        assert!(alarm.validate().is_err());
    }

    #[test]
    fn setting_specific_date_clears_repeat_days() {
        let mut alarm = sample_alarm();
        alarm.set_specific_date("2026-03-01");
        assert!(alarm.repeat_days.is_empty());
        assert_eq!(alarm.specific_date, "2026-03-01");
        assert!(alarm.validate().is_ok());
    }

    #[test]
    fn setting_repeat_days_clears_specific_date() {
        let mut alarm = Alarm::new(3, 8, 15);
        alarm.set_specific_date("2026-03-01");
        alarm.set_repeat_days(BTreeSet::from([0, 6]));
        assert!(alarm.specific_date.is_empty());
        assert!(alarm.validate().is_ok());
    }

    #[test]
    fn activation_states_report_liveness() {
        assert!(!Activation::Disabled.is_live());
        assert!(
            Activation::Enabled {
                scheduled_at: fixed_time("2026-02-16T06:30:00")
            }
            .is_live()
        );
        assert!(
            !Activation::AwaitingReactivation {
                next_fire: fixed_time("2026-02-20T06:30:00")
            }
            .is_live()
        );
        assert!(
            Activation::Reactivated {
                fire_at: fixed_time("2026-02-20T06:30:00")
            }
            .is_live()
        );
    }

    #[test]
    fn weekday_index_starts_at_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 2, 15).expect("valid date");
        assert_eq!(weekday_index(sunday), 0);
        assert_eq!(weekday_index(sunday + chrono::Days::new(6)), 6);
    }

    #[test]
    fn alarm_supports_serde_roundtrip() {
        let alarm = sample_alarm();
        let roundtrip: Alarm =
            serde_json::from_str(&serde_json::to_string(&alarm).expect("serialize alarm"))
                .expect("deserialize alarm");
        assert_eq!(roundtrip, alarm);
    }

    #[test]
    fn alarm_payloads_without_a_url_still_deserialize() {
        let mut alarm = sample_alarm();
        alarm.url.clear();
        let mut value = serde_json::to_value(&alarm).expect("serialize alarm");
        value.as_object_mut().expect("json object").remove("url");

        let decoded: Alarm = serde_json::from_value(value).expect("deserialize alarm");
        assert_eq!(decoded, alarm);
    }

    proptest! {
        #[test]
        fn recurrence_kinds_stay_mutually_exclusive(
            days in proptest::collection::btree_set(0u8..7, 0..7),
            pick_date in proptest::bool::ANY
        ) {
            let mut alarm = Alarm::new(4, 12, 0);
            alarm.set_repeat_days(days.clone());
            if pick_date {
                alarm.set_specific_date("2026-05-01");
            }
            prop_assert!(alarm.repeat_days.is_empty() || alarm.specific_date.is_empty());
            prop_assert!(alarm.validate().is_ok());
        }
    }
}
