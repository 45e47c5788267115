//! Status engine: derives a bag's traffic-light status from its control
//! dates and the soonest item expiry.
//!
//! This is the single classification rule used everywhere a status is
//! computed: the interactive save path, the batch recompute and (through
//! the recompute) the daily alert sweep.

use chrono::NaiveDate;

use crate::models::BagStatus;

/// Days of remaining margin below which a bag turns orange.
pub const ORANGE_THRESHOLD_DAYS: i64 = 30;

/// Classify a bag.
///
/// An expired contained item wins over the control-date rule and always
/// yields `Purple`. With no item expiry and no next control date there is
/// nothing to classify against, so `None` is returned and the caller keeps
/// the stored status.
pub fn classify(
    today: NaiveDate,
    next_control: Option<NaiveDate>,
    item_expiry: Option<NaiveDate>,
) -> Option<BagStatus> {
    if let Some(expiry) = item_expiry {
        if expiry < today {
            return Some(BagStatus::Purple);
        }
    }

    let next = next_control?;
    let days_left = (next - today).num_days();
    Some(if days_left < 0 {
        BagStatus::Red
    } else if days_left < ORANGE_THRESHOLD_DAYS {
        BagStatus::Orange
    } else {
        BagStatus::Green
    })
}

/// Parse a stored or submitted date. Accepts ISO `YYYY-MM-DD` and the
/// legacy `DD/MM/YYYY`; empty strings and the placeholder values "/" and
/// "-" mean "no constraint", as does anything unparsable.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() || s == "/" || s == "-" {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .ok()
}

/// DD/MM/YYYY display form used in history rows and mail bodies.
pub fn format_date_fr(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Display form of a stored ISO date string; empty or unparsable input
/// passes through unchanged.
pub fn display_date(stored: &str) -> String {
    match parse_date(stored) {
        Some(d) => format_date_fr(d),
        None => stored.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn green_when_far_from_next_control() {
        let today = date(2026, 1, 1);
        let status = classify(today, Some(date(2026, 3, 1)), None);
        assert_eq!(status, Some(BagStatus::Green));
    }

    #[test]
    fn orange_under_thirty_days() {
        let today = date(2026, 1, 1);
        assert_eq!(
            classify(today, Some(date(2026, 1, 30)), None),
            Some(BagStatus::Orange)
        );
        // boundary: exactly 30 days left is still green
        assert_eq!(
            classify(today, Some(date(2026, 1, 31)), None),
            Some(BagStatus::Green)
        );
        // due today is orange, not red
        assert_eq!(
            classify(today, Some(today), None),
            Some(BagStatus::Orange)
        );
    }

    #[test]
    fn red_once_next_control_passed() {
        let today = date(2026, 1, 1);
        assert_eq!(
            classify(today, Some(date(2025, 12, 31)), None),
            Some(BagStatus::Red)
        );
    }

    #[test]
    fn thirty_day_frequency_scenario() {
        // frequency 30 days, last control at day 0 => next control at day 30
        let last = date(2026, 1, 1);
        let next = last + chrono::Duration::days(30);

        // day 29: orange
        let day29 = last + chrono::Duration::days(29);
        assert_eq!(classify(day29, Some(next), None), Some(BagStatus::Orange));

        // day 31: red
        let day31 = last + chrono::Duration::days(31);
        assert_eq!(classify(day31, Some(next), None), Some(BagStatus::Red));
    }

    #[test]
    fn expired_item_wins_over_control_date() {
        let today = date(2026, 1, 1);
        // next control far away, but an item expired yesterday
        assert_eq!(
            classify(today, Some(date(2026, 6, 1)), Some(date(2025, 12, 31))),
            Some(BagStatus::Purple)
        );
        // even with no next control at all
        assert_eq!(
            classify(today, None, Some(date(2025, 1, 1))),
            Some(BagStatus::Purple)
        );
    }

    #[test]
    fn item_expiring_today_is_not_expired() {
        let today = date(2026, 1, 1);
        assert_eq!(
            classify(today, Some(date(2026, 6, 1)), Some(today)),
            Some(BagStatus::Green)
        );
    }

    #[test]
    fn no_dates_leaves_status_unchanged() {
        let today = date(2026, 1, 1);
        assert_eq!(classify(today, None, None), None);
    }

    #[test]
    fn parses_iso_and_french_dates() {
        assert_eq!(parse_date("2026-03-01"), Some(date(2026, 3, 1)));
        assert_eq!(parse_date("01/03/2026"), Some(date(2026, 3, 1)));
        assert_eq!(parse_date(" 2026-03-01 "), Some(date(2026, 3, 1)));
    }

    #[test]
    fn malformed_dates_mean_no_constraint() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("/"), None);
        assert_eq!(parse_date("-"), None);
        assert_eq!(parse_date("juin-30"), None);
        assert_eq!(parse_date("30/102026"), None);
    }

    #[test]
    fn displays_iso_dates_in_french_form() {
        assert_eq!(display_date("2026-03-01"), "01/03/2026");
        assert_eq!(display_date(""), "");
    }
}
