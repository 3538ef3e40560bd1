use crate::domain::holiday;
use crate::domain::models::{Alarm, weekday_index};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use thiserror::Error;

/// Hard bound on the holiday-skip search, so a pathological calendar can
/// never loop forever.
pub const HOLIDAY_SEARCH_LIMIT_DAYS: u32 = 14;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid alarm time {hour:02}:{minute:02}")]
    InvalidTime { hour: u8, minute: u8 },
    #[error("invalid specific date '{0}': expected YYYY-MM-DD")]
    InvalidSpecificDate(String),
    #[error("no working day found within {limit} days after {start}")]
    ResolutionExhausted { start: NaiveDate, limit: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyOccurrence {
    pub weekday: u8,
    pub fire_at: NaiveDateTime,
}

/// Outcome of resolving an alarm against a point in time. `moved_to` is
/// set when a holiday-excluded specific date had to move; the caller is
/// expected to persist the replacement date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Weekly(Vec<WeeklyOccurrence>),
    Single {
        fire_at: NaiveDateTime,
        moved_to: Option<NaiveDate>,
    },
}

/// Next valid trigger instant(s) for an alarm, strictly after `now`.
///
/// Comparisons against `now` are inclusive: a candidate equal to the
/// current instant counts as already passed and rolls forward, so a stale
/// registration can never fire twice.
pub fn resolve(alarm: &Alarm, now: NaiveDateTime) -> Result<Resolution, ResolveError> {
    let time = alarm_time(alarm)?;

    if alarm.is_repeating() {
        return Ok(Resolution::Weekly(weekly_occurrences(alarm, now)?));
    }

    if alarm.has_specific_date() {
        let date = parse_specific_date(&alarm.specific_date)?;
        let mut candidate = date.and_time(time);
        if candidate <= now {
            candidate += Duration::days(1);
        }
        if alarm.exclude_holidays && holiday::is_holiday(candidate.date()) {
            let replacement = next_working_day(candidate.date())?;
            return Ok(Resolution::Single {
                fire_at: replacement.and_time(time),
                moved_to: Some(replacement),
            });
        }
        return Ok(Resolution::Single {
            fire_at: candidate,
            moved_to: None,
        });
    }

    let mut candidate = now.date().and_time(time);
    if candidate <= now {
        candidate += Duration::days(1);
    }
    Ok(Resolution::Single {
        fire_at: candidate,
        moved_to: None,
    })
}

/// One candidate per selected weekday. Holiday exclusion is deliberately
/// not applied to weekly repeaters; next week's occurrence fires normally.
pub fn weekly_occurrences(
    alarm: &Alarm,
    anchor: NaiveDateTime,
) -> Result<Vec<WeeklyOccurrence>, ResolveError> {
    let time = alarm_time(alarm)?;
    Ok(alarm
        .repeat_days
        .iter()
        .map(|&weekday| WeeklyOccurrence {
            weekday,
            fire_at: next_weekly_occurrence(time, weekday, anchor),
        })
        .collect())
}

/// Earliest upcoming occurrence across the selected weekdays; `None` for a
/// non-repeating alarm.
pub fn first_weekly_occurrence(
    alarm: &Alarm,
    anchor: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, ResolveError> {
    Ok(weekly_occurrences(alarm, anchor)?
        .into_iter()
        .map(|occurrence| occurrence.fire_at)
        .min())
}

/// Earliest upcoming occurrence with today's weekday forced into next
/// week, even when today's instant has not passed yet ("today only off").
pub fn first_occurrence_skipping_today(
    alarm: &Alarm,
    now: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, ResolveError> {
    let time = alarm_time(alarm)?;
    let today = weekday_index(now.date());
    Ok(alarm
        .repeat_days
        .iter()
        .map(|&weekday| {
            let mut fire_at = next_weekly_occurrence(time, weekday, now);
            if weekday == today && fire_at.date() == now.date() {
                fire_at += Duration::weeks(1);
            }
            fire_at
        })
        .min())
}

/// Next instant at `time` on the given weekday, strictly after `anchor`.
pub fn next_weekly_occurrence(time: NaiveTime, weekday: u8, anchor: NaiveDateTime) -> NaiveDateTime {
    let days_ahead = (i64::from(weekday) - i64::from(weekday_index(anchor.date()))).rem_euclid(7);
    let mut candidate = (anchor.date() + Duration::days(days_ahead)).and_time(time);
    if candidate <= anchor {
        candidate += Duration::weeks(1);
    }
    candidate
}

/// First day strictly after `after` that is neither a weekend day nor a
/// national holiday, bounded by [`HOLIDAY_SEARCH_LIMIT_DAYS`].
pub fn next_working_day(after: NaiveDate) -> Result<NaiveDate, ResolveError> {
    let mut cursor = after;
    for _ in 0..HOLIDAY_SEARCH_LIMIT_DAYS {
        cursor = match cursor.succ_opt() {
            Some(next) => next,
            None => break,
        };
        let weekend = matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun);
        if !weekend && !holiday::is_holiday(cursor) {
            return Ok(cursor);
        }
    }
    Err(ResolveError::ResolutionExhausted {
        start: after,
        limit: HOLIDAY_SEARCH_LIMIT_DAYS,
    })
}

fn alarm_time(alarm: &Alarm) -> Result<NaiveTime, ResolveError> {
    NaiveTime::from_hms_opt(u32::from(alarm.hour), u32::from(alarm.minute), 0).ok_or(
        ResolveError::InvalidTime {
            hour: alarm.hour,
            minute: alarm.minute,
        },
    )
}

fn parse_specific_date(value: &str) -> Result<NaiveDate, ResolveError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ResolveError::InvalidSpecificDate(value.to_string()))
}
