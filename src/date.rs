//! Date normalization for report messages and the entry form.
//!
//! Group messages and the interactive form accept slightly different
//! inputs: only the form path takes native `YYYY-MM-DD` and rejects dates
//! in the future. The two paths are kept separate on purpose.

use chrono::{Duration, Local, NaiveDate};

use crate::error::DateError;

/// Source of "today", injected so relative dates are testable.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The machine's local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Normalize a date from a group report message to `YYYY-MM-DD`.
///
/// Accepts "today", "yesterday" and day-first `D/M/Y` with `/`, `-` or `.`
/// separators. Components are range-checked (day 1–31, month 1–12,
/// year ≥ 2000) but not checked against the calendar, and future dates
/// are allowed.
pub fn normalize_group_date(raw: &str, today: NaiveDate) -> Result<String, DateError> {
    let trimmed = raw.trim();
    if let Some(relative) = relative_date(trimmed, today) {
        return Ok(format_iso(relative));
    }

    let (day, month, year) =
        parse_day_first(trimmed).ok_or_else(|| DateError::Invalid(trimmed.to_string()))?;
    Ok(format!("{year:04}-{month:02}-{day:02}"))
}

/// Normalize a date typed into the entry form.
///
/// Everything the group path accepts plus native `YYYY-MM-DD`. The result
/// must be a real calendar date no later than `today`.
pub fn normalize_form_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, DateError> {
    let trimmed = raw.trim();
    let invalid = || DateError::Invalid(trimmed.to_string());

    let date = if let Some(relative) = relative_date(trimmed, today) {
        relative
    } else if let Some((year, month, day)) = parse_iso(trimmed) {
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?
    } else {
        let (day, month, year) = parse_day_first(trimmed).ok_or_else(invalid)?;
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?
    };

    if date > today {
        return Err(DateError::Future(date));
    }
    Ok(date)
}

/// Split a canonical `YYYY-MM-DD` string into its components.
///
/// Same component ranges as the day-first path; a zero-padded month and
/// day are required.
pub fn parse_iso(s: &str) -> Option<(i32, u32, u32)> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = s
        .char_indices()
        .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit());
    if !digits_ok {
        return None;
    }

    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[5..7].parse().ok()?;
    let day: u32 = s[8..10].parse().ok()?;
    in_range(day, month, year).then_some((year, month, day))
}

/// True when `s` has the canonical `YYYY-MM-DD` shape.
pub fn is_iso_date(s: &str) -> bool {
    parse_iso(s).is_some()
}

fn relative_date(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    if s.eq_ignore_ascii_case("today") {
        Some(today)
    } else if s.eq_ignore_ascii_case("yesterday") {
        Some(today - Duration::days(1))
    } else {
        None
    }
}

/// `D/M/Y`, `D-M-Y` or `D.M.Y` → (day, month, year).
fn parse_day_first(s: &str) -> Option<(u32, u32, i32)> {
    let parts: Vec<&str> = s.split(['/', '-', '.']).collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;
    in_range(day, month, year).then_some((day, month, year))
}

fn in_range(day: u32, month: u32, year: i32) -> bool {
    (1..=31).contains(&day) && (1..=12).contains(&month) && year >= 2000
}

fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
