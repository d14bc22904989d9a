//! Date and datetime utilities.
//!
//! SAS stores dates as days since 1960-01-01 and datetimes as seconds
//! since 1960-01-01T00:00:00; SDTM wants ISO 8601 extended format with
//! right truncation for partial values.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::warn;

/// The SAS epoch.
fn sas_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1960, 1, 1).unwrap_or_default()
}

/// SAS numeric date (days since 1960-01-01) to `YYYY-MM-DD`.
pub fn sas_date_to_iso(days: f64) -> Option<String> {
    if !days.is_finite() {
        return None;
    }
    let date = sas_epoch().checked_add_signed(Duration::days(days.round() as i64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// SAS numeric datetime (seconds since 1960-01-01) to
/// `YYYY-MM-DDTHH:MM:SS`, timezone-naive per SDTM convention.
pub fn sas_datetime_to_iso(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    let epoch: NaiveDateTime = sas_epoch().and_hms_opt(0, 0, 0)?;
    let dt = epoch.checked_add_signed(Duration::seconds(seconds.round() as i64))?;
    Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Parse a full `YYYY-MM-DD` ISO date (datetime prefixes accepted).
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.trim().split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

struct StringDateFormats {
    dd_mon_yyyy: Regex,
    ddmonyyyy: Regex,
    iso: Regex,
    dd_dash_mon: Regex,
    slash: Regex,
    mon_yyyy: Regex,
    year: Regex,
}

fn formats() -> &'static StringDateFormats {
    static FORMATS: OnceLock<StringDateFormats> = OnceLock::new();
    FORMATS.get_or_init(|| {
        let build = |p: &str| Regex::new(p).unwrap_or_else(|_| unreachable!());
        StringDateFormats {
            dd_mon_yyyy: build(r"^(\d{1,2}) ([A-Za-z]{3}) (\d{4})$"),
            ddmonyyyy: build(r"^(\d{1,2})([A-Za-z]{3})(\d{4})$"),
            iso: build(r"^(\d{4})-(\d{2})-(\d{2})$"),
            dd_dash_mon: build(r"^(\d{1,2})-([A-Za-z]{3})-(\d{4})$"),
            slash: build(r"^(\d{1,2})/(\d{1,2})/(\d{4})$"),
            mon_yyyy: build(r"^([A-Za-z]{3}) (\d{4})$"),
            year: build(r"^(\d{4})$"),
        }
    })
}

fn month_number(token: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    let upper = token.to_uppercase();
    MONTHS.iter().position(|m| *m == upper).map(|i| i as u32 + 1)
}

/// Whether a date token is an unknown marker (UN/UNK), which truncates
/// rather than invalidates.
fn is_unknown_token(token: &str) -> bool {
    matches!(token.trim().to_uppercase().as_str(), "UN" | "UNK")
}

/// Parse a free-text date into ISO 8601.
///
/// Recognizes, in order: `DD Mon YYYY`, `DDMonYYYY`, `YYYY-MM-DD`,
/// `DD-Mon-YYYY`, `DD/MM/YYYY` (ambiguous slash dates default to DD/MM
/// with a logged warning), `Mon YYYY`, and `YYYY`. UN/UNK day or month
/// tokens truncate the result. Unrecognized input returns None.
pub fn parse_string_date_to_iso(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let f = formats();

    if let Some(caps) = f.dd_mon_yyyy.captures(trimmed) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return full_date(year, month, day);
    }

    if let Some(caps) = f.ddmonyyyy.captures(trimmed) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return full_date(year, month, day);
    }

    if let Some(caps) = f.iso.captures(trimmed) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return full_date(year, month, day);
    }

    if let Some(caps) = f.dd_dash_mon.captures(trimmed) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return full_date(year, month, day);
    }

    if let Some(caps) = f.slash.captures(trimmed) {
        // DD/MM vs MM/DD is genuinely ambiguous for values ≤ 12 on both
        // sides; the study convention here is day-first.
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        if day <= 12 && month <= 12 && day != month {
            warn!(value = trimmed, "ambiguous slash date; assuming DD/MM/YYYY");
        }
        return full_date(year, month, day);
    }

    if let Some(caps) = f.mon_yyyy.captures(trimmed) {
        let month = month_number(&caps[1])?;
        let year: i32 = caps[2].parse().ok()?;
        return Some(format!("{year:04}-{month:02}"));
    }

    if f.year.is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    // `UN Mon YYYY` / `UNK 2023` style partials: unknown leading tokens
    // truncate to what is known.
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() == 3 && is_unknown_token(parts[0]) {
        if let (Some(month), Ok(year)) = (month_number(parts[1]), parts[2].parse::<i32>()) {
            return Some(format!("{year:04}-{month:02}"));
        }
        if is_unknown_token(parts[1]) && let Ok(year) = parts[2].parse::<i32>() {
            return Some(format!("{year:04}"));
        }
    }

    None
}

fn full_date(year: i32, month: u32, day: u32) -> Option<String> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Assemble a right-truncating partial ISO 8601 value.
///
/// Truncation stops at the first missing component; later components are
/// ignored so the output never contains gaps. An hour without a minute
/// drops the whole time part: `T10` alone is not valid SDTM.
pub fn format_partial_iso8601(
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
) -> Option<String> {
    let year = year?;
    let mut out = format!("{year:04}");

    let Some(month) = month else { return Some(out) };
    out.push_str(&format!("-{month:02}"));

    let Some(day) = day else { return Some(out) };
    out.push_str(&format!("-{day:02}"));

    let (Some(hour), Some(minute)) = (hour, minute) else {
        return Some(out);
    };
    out.push_str(&format!("T{hour:02}:{minute:02}"));

    if let Some(second) = second {
        out.push_str(&format!(":{second:02}"));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sas_epoch_is_day_zero() {
        assert_eq!(sas_date_to_iso(0.0).as_deref(), Some("1960-01-01"));
        assert_eq!(sas_date_to_iso(1.0).as_deref(), Some("1960-01-02"));
        assert_eq!(sas_date_to_iso(-1.0).as_deref(), Some("1959-12-31"));
    }

    #[test]
    fn datetime_uses_seconds_not_days() {
        // A value this large is unmistakably seconds; treating it as days
        // would overflow into a nonsense year.
        assert_eq!(
            sas_datetime_to_iso(1_964_217_600.0).as_deref(),
            Some("2022-03-30T00:00:00")
        );
    }

    #[test]
    fn string_date_chain() {
        assert_eq!(
            parse_string_date_to_iso("30 Mar 2022").as_deref(),
            Some("2022-03-30")
        );
        assert_eq!(
            parse_string_date_to_iso("30MAR2022").as_deref(),
            Some("2022-03-30")
        );
        assert_eq!(
            parse_string_date_to_iso("2022-03-30").as_deref(),
            Some("2022-03-30")
        );
        assert_eq!(
            parse_string_date_to_iso("30-Mar-2022").as_deref(),
            Some("2022-03-30")
        );
        assert_eq!(
            parse_string_date_to_iso("05/04/2022").as_deref(),
            Some("2022-04-05")
        );
        assert_eq!(
            parse_string_date_to_iso("Mar 2022").as_deref(),
            Some("2022-03")
        );
        assert_eq!(parse_string_date_to_iso("2022").as_deref(), Some("2022"));
        assert_eq!(parse_string_date_to_iso("sometime"), None);
    }

    #[test]
    fn unknown_tokens_truncate() {
        assert_eq!(
            parse_string_date_to_iso("UN Mar 2022").as_deref(),
            Some("2022-03")
        );
        assert_eq!(
            parse_string_date_to_iso("UN UNK 2022").as_deref(),
            Some("2022")
        );
    }

    #[test]
    fn partial_truncates_never_pads() {
        assert_eq!(
            format_partial_iso8601(Some(2023), Some(3), None, None, None, None).as_deref(),
            Some("2023-03")
        );
        assert_eq!(
            format_partial_iso8601(Some(2023), None, Some(15), None, None, None).as_deref(),
            Some("2023")
        );
        assert_eq!(format_partial_iso8601(None, Some(3), Some(15), None, None, None), None);
    }

    #[test]
    fn hour_without_minute_drops_time() {
        assert_eq!(
            format_partial_iso8601(Some(2023), Some(3), Some(15), Some(10), None, None).as_deref(),
            Some("2023-03-15")
        );
        assert_eq!(
            format_partial_iso8601(Some(2023), Some(3), Some(15), Some(10), Some(30), None)
                .as_deref(),
            Some("2023-03-15T10:30")
        );
        assert_eq!(
            format_partial_iso8601(Some(2023), Some(3), Some(15), Some(10), Some(30), Some(5))
                .as_deref(),
            Some("2023-03-15T10:30:05")
        );
    }
}
