use chrono::{NaiveDate, NaiveDateTime};
use lazy_regex::regex_captures;

/// Parses a publish timestamp such as `2025-01-27 14:30` or `2025.01.27`.
///
/// Patterns are searched anywhere in the input, date-time first. A pattern
/// whose numbers do not form a valid date is skipped. No timezone is attached.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let date_time = || -> Option<NaiveDateTime> {
        let (_, y, m, d, h, min) =
            regex_captures!(r"(\d{4})[.-](\d{2})[.-](\d{2})\s*(\d{2}):(\d{2})", raw)?;
        ymd(y, m, d)?.and_hms_opt(h.parse().ok()?, min.parse().ok()?, 0)
    };
    let date_only = || -> Option<NaiveDateTime> {
        let (_, y, m, d) = regex_captures!(r"(\d{4})[.-](\d{2})[.-](\d{2})", raw)?;
        ymd(y, m, d)?.and_hms_opt(0, 0, 0)
    };

    date_time().or_else(date_only)
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}
