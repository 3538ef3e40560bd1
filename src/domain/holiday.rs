use chrono::{Datelike, NaiveDate, Weekday};

/// Longest chain of consecutive holiday/citizen's-holiday days the transfer
/// walks ever need to cross (Golden Week plus margin).
const WALK_LIMIT_DAYS: u32 = 7;

/// Japanese national-holiday check: fixed and calculated holidays, transfer
/// holidays ("furikae kyujitsu") and citizen's holidays ("kokumin no
/// kyujitsu"). Pure and deterministic for any Gregorian date.
pub fn is_holiday(date: NaiveDate) -> bool {
    is_fixed_or_calculated(date) || is_transfer_holiday(date) || is_citizen_holiday(date)
}

pub fn is_holiday_ymd(year: i32, month: u32, day: u32) -> bool {
    NaiveDate::from_ymd_opt(year, month, day).is_some_and(is_holiday)
}

fn is_fixed_or_calculated(date: NaiveDate) -> bool {
    let day = date.day();
    match date.month() {
        // New Year's Day, Coming-of-Age Day (2nd Monday)
        1 => day == 1 || is_nth_weekday(date, 2, Weekday::Mon),
        // National Foundation Day, Emperor's Birthday
        2 => day == 11 || day == 23,
        3 => day == vernal_equinox_day(date.year()),
        // Showa Day
        4 => day == 29,
        // Constitution Day, Greenery Day, Children's Day
        5 => (3..=5).contains(&day),
        // Marine Day (3rd Monday)
        7 => is_nth_weekday(date, 3, Weekday::Mon),
        // Mountain Day
        8 => day == 11,
        // Respect-for-the-Aged Day (3rd Monday), autumnal equinox
        9 => is_nth_weekday(date, 3, Weekday::Mon) || day == autumnal_equinox_day(date.year()),
        // Sports Day (2nd Monday)
        10 => is_nth_weekday(date, 2, Weekday::Mon),
        // Culture Day, Labor Thanksgiving Day
        11 => day == 3 || day == 23,
        _ => false,
    }
}

/// A fixed/calculated holiday falling on Sunday grants a holiday on the
/// next day that is not itself a holiday or citizen's holiday. Scans
/// backward for such a Sunday, then walks the consecutive-holiday chain
/// forward; both walks are capped.
fn is_transfer_holiday(date: NaiveDate) -> bool {
    if date.weekday() == Weekday::Sun {
        return false;
    }

    let mut cursor = date;
    for _ in 0..WALK_LIMIT_DAYS {
        cursor = match cursor.pred_opt() {
            Some(previous) => previous,
            None => return false,
        };
        if cursor.weekday() == Weekday::Sun {
            return is_fixed_or_calculated(cursor) && transfer_day_for(cursor) == Some(date);
        }
        if !is_fixed_or_calculated(cursor) && !is_citizen_holiday(cursor) {
            return false;
        }
    }
    false
}

fn transfer_day_for(sunday_holiday: NaiveDate) -> Option<NaiveDate> {
    let mut cursor = sunday_holiday;
    for _ in 0..WALK_LIMIT_DAYS {
        cursor = cursor.succ_opt()?;
        if !is_fixed_or_calculated(cursor) && !is_citizen_holiday(cursor) {
            return Some(cursor);
        }
    }
    None
}

/// A non-Sunday weekday sandwiched between two fixed/calculated holidays.
fn is_citizen_holiday(date: NaiveDate) -> bool {
    if date.weekday() == Weekday::Sun || is_fixed_or_calculated(date) {
        return false;
    }
    let (Some(previous), Some(next)) = (date.pred_opt(), date.succ_opt()) else {
        return false;
    };
    is_fixed_or_calculated(previous) && is_fixed_or_calculated(next)
}

fn is_nth_weekday(date: NaiveDate, n: u32, weekday: Weekday) -> bool {
    date.weekday() == weekday && (date.day() - 1) / 7 + 1 == n
}

/// Day-of-month of the vernal equinox, via the floor-based linear
/// approximation calibrated per year range.
pub fn vernal_equinox_day(year: i32) -> u32 {
    equinox_day(year, 20.8357, 20.8431, 21.8510)
}

/// Day-of-month of the autumnal equinox.
pub fn autumnal_equinox_day(year: i32) -> u32 {
    equinox_day(year, 23.2588, 23.2488, 24.2488)
}

fn equinox_day(year: i32, base_early: f64, base_modern: f64, base_late: f64) -> u32 {
    let base = if year <= 1979 {
        base_early
    } else if year <= 2099 {
        base_modern
    } else {
        base_late
    };
    let offset = year - 1980;
    let day = (base + 0.242194 * f64::from(offset)).floor() as i64 - i64::from(offset.div_euclid(4));
    day.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn new_year_is_a_holiday() {
        assert!(is_holiday(date(2024, 1, 1)));
    }

    #[test]
    fn second_monday_of_january_is_coming_of_age_day() {
        assert!(is_holiday(date(2024, 1, 8)));
        assert!(!is_holiday(date(2024, 1, 15)));
    }

    #[test]
    fn equinox_days_match_known_years() {
        assert_eq!(vernal_equinox_day(2024), 20);
        assert_eq!(vernal_equinox_day(2025), 20);
        assert_eq!(autumnal_equinox_day(2024), 22);
        assert_eq!(autumnal_equinox_day(2025), 23);
        assert!(is_holiday(date(2024, 3, 20)));
        assert!(is_holiday(date(2024, 9, 22)));
    }

    #[test]
    fn sunday_new_year_transfers_to_monday() {
        // Jan 1 2023 fell on a Sunday.
        assert!(is_holiday(date(2023, 1, 1)));
        assert!(is_holiday(date(2023, 1, 2)));
        assert!(!is_holiday(date(2023, 1, 3)));
    }

    #[test]
    fn sunday_foundation_day_transfers_to_monday() {
        // Feb 11 2024 fell on a Sunday.
        assert!(is_holiday(date(2024, 2, 12)));
    }

    #[test]
    fn golden_week_transfer_skips_the_holiday_chain() {
        // May 4 2025 (Greenery Day) fell on a Sunday; May 5 is Children's
        // Day, so the transfer lands on May 6.
        assert!(is_holiday(date(2025, 5, 6)));
        assert!(!is_holiday(date(2025, 5, 7)));
    }

    #[test]
    fn monday_after_weekday_new_year_is_not_a_transfer() {
        // Jan 1 2024 was a Monday; nothing to transfer.
        assert!(!is_holiday(date(2024, 1, 2)));
    }

    #[test]
    fn day_between_two_holidays_is_a_citizen_holiday() {
        // Sep 21 2026 is Respect-for-the-Aged Day, Sep 23 the autumnal
        // equinox; the Tuesday in between becomes a holiday.
        assert!(is_holiday(date(2026, 9, 21)));
        assert!(is_holiday(date(2026, 9, 23)));
        assert!(is_holiday(date(2026, 9, 22)));
    }

    #[test]
    fn ordinary_days_are_not_holidays() {
        assert!(!is_holiday(date(2024, 6, 4)));
        assert!(!is_holiday(date(2024, 12, 25)));
    }

    #[test]
    fn invalid_dates_are_not_holidays() {
        assert!(!is_holiday_ymd(2024, 2, 30));
        assert!(is_holiday_ymd(2024, 1, 1));
    }

    proptest! {
        #[test]
        fn fixed_or_calculated_days_always_report_as_holidays(
            year in 1950i32..2150,
            ordinal in 1u32..=365
        ) {
            let Some(day) = NaiveDate::from_yo_opt(year, ordinal) else {
                return Ok(());
            };
            if is_fixed_or_calculated(day) {
                prop_assert!(is_holiday(day));
            }
        }

        #[test]
        fn transfer_holidays_never_fall_on_sunday(
            year in 1950i32..2150,
            ordinal in 1u32..=365
        ) {
            let Some(day) = NaiveDate::from_yo_opt(year, ordinal) else {
                return Ok(());
            };
            if is_transfer_holiday(day) {
                prop_assert!(day.weekday() != Weekday::Sun);
            }
        }
    }
}
