//! Opening-policy extraction from platform prose.
//!
//! Platforms describe house booking policies in free text ("Reservations are
//! released 14 days in advance at 9 AM"). This module turns that prose into
//! provisional structured fields. Pure text-to-fields, no network anywhere;
//! the horizon strategies override these values when they produce an answer.

use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

use crate::models::OpeningPattern;

/// Provisional opening policy parsed from prose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyHints {
    pub opening_window_days: Option<i64>,
    pub opening_time: Option<NaiveTime>,
    pub opening_pattern: Option<OpeningPattern>,
}

static WINDOW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,3})\s+days?\s+in\s+advance").unwrap());

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:available|released?|opens?|drop)\s+(?:daily\s+)?at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?")
        .unwrap()
});

static MIDNIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:available|released?|opens?|drop)\s+at\s+(midnight|noon)").unwrap());

static ROLLING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)each\s+new\s+date|rolling\s+(?:basis|window)?").unwrap());

static BULK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)first\s+of\s+(?:the|each|every)\s+month|released\s+on\s+the\s+\d{1,2}(?:st|nd|rd|th)")
        .unwrap()
});

/// Extract opening policy hints from free text.
pub fn extract(text: &str) -> PolicyHints {
    PolicyHints {
        opening_window_days: extract_window(text),
        opening_time: extract_time(text),
        opening_pattern: extract_pattern(text),
    }
}

fn extract_window(text: &str) -> Option<i64> {
    WINDOW_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_time(text: &str) -> Option<NaiveTime> {
    if let Some(captures) = MIDNIGHT_RE.captures(text) {
        let hour = match captures.get(1).map(|m| m.as_str().to_lowercase()) {
            Some(word) if word == "noon" => 12,
            _ => 0,
        };
        return NaiveTime::from_hms_opt(hour, 0, 0);
    }

    let captures = TIME_RE.captures(text)?;
    let mut hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    match captures.get(3).map(|m| m.as_str().to_lowercase()) {
        Some(meridiem) if meridiem == "pm" && hour < 12 => hour += 12,
        Some(meridiem) if meridiem == "am" && hour == 12 => hour = 0,
        // Bare hour without am/pm is too ambiguous to trust.
        None => return None,
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn extract_pattern(text: &str) -> Option<OpeningPattern> {
    if ROLLING_RE.is_match(text) {
        Some(OpeningPattern::Rolling)
    } else if BULK_RE.is_match(text) {
        Some(OpeningPattern::Bulk)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_days() {
        let hints = extract("Reservations open 30 days in advance.");
        assert_eq!(hints.opening_window_days, Some(30));
        assert_eq!(extract("open 1 day in advance").opening_window_days, Some(1));
    }

    #[test]
    fn test_opening_time_am_pm() {
        let hints = extract("Tables are available at 9 AM each new date.");
        assert_eq!(hints.opening_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(hints.opening_pattern, Some(OpeningPattern::Rolling));

        let hints = extract("Reservations released at 12:30 pm");
        assert_eq!(hints.opening_time, NaiveTime::from_hms_opt(12, 30, 0));
    }

    #[test]
    fn test_opening_time_midnight() {
        let hints = extract("New dates released at midnight, 28 days in advance.");
        assert_eq!(hints.opening_time, NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(hints.opening_window_days, Some(28));
    }

    #[test]
    fn test_bulk_pattern() {
        let hints = extract("The full month is released on the 1st.");
        assert_eq!(hints.opening_pattern, Some(OpeningPattern::Bulk));
        let hints = extract("Bookings open on the first of each month at 10 AM.");
        assert_eq!(hints.opening_pattern, Some(OpeningPattern::Bulk));
    }

    #[test]
    fn test_unhelpful_text_yields_nothing() {
        assert_eq!(extract("A lovely neighborhood bistro."), PolicyHints::default());
        // Bare hour with no meridiem is ignored.
        assert_eq!(extract("opens at 9").opening_time, None);
    }
}
