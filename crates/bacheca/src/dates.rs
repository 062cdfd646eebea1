//! Flexible parsing of human-entered initiative dates.
//!
//! Initiative dates are free text from multiple sources (staff entry, bulk
//! imports), so there is no single format to rely on. This module turns that
//! text into a structured day or day-range and answers the two questions the
//! calendar view asks: "which initiatives are active on this day?" and
//! "which day should the view open on?"

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use crate::types::Initiative;

/// A parsed date or date span, at day precision.
///
/// `end` is present only when the source text describes a span (a month-year
/// range, or a single month-year treated as spanning the whole month).
/// When `end` is present, `end >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

/// Italian month names, lowercase
const MESI: &[(&str, u32)] = &[
    ("gennaio", 1),
    ("febbraio", 2),
    ("marzo", 3),
    ("aprile", 4),
    ("maggio", 5),
    ("giugno", 6),
    ("luglio", 7),
    ("agosto", 8),
    ("settembre", 9),
    ("ottobre", 10),
    ("novembre", 11),
    ("dicembre", 12),
];

/// Matches a D/M/YYYY or DD/MM/YYYY date anywhere in surrounding prose
fn dmy_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap())
}

/// Parse free-form date text into a structured range.
///
/// Tries an ordered chain of independent rules; the first one that produces
/// a result wins:
/// 1. ISO 8601 date or timestamp
/// 2. numeric `D/M/YYYY` substring, day-first (Italian convention)
/// 3. "Mese AAAA - Mese AAAA" range split at the first hyphen
/// 4. a single "Mese AAAA"
///
/// Text that matches none of the rules yields `None`, never an error:
/// callers treat unparseable dates as "never shown on any calendar day".
pub fn parse_date_text(text: &str) -> Option<ParsedDateRange> {
    const ATTEMPTS: &[fn(&str) -> Option<ParsedDateRange>] = &[
        try_iso,
        try_day_month_year,
        try_month_range,
        try_month_year,
    ];

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    ATTEMPTS.iter().find_map(|attempt| attempt(trimmed))
}

/// Rule 1: the whole text is an ISO 8601 date or timestamp.
/// Timestamps are truncated to their calendar date.
fn try_iso(text: &str) -> Option<ParsedDateRange> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(ParsedDateRange {
            start: date,
            end: None,
        });
    }

    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(ParsedDateRange {
            start: datetime.date_naive(),
            end: None,
        });
    }

    // Timestamps without an offset (e.g. "2024-06-15T09:00:00")
    if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(ParsedDateRange {
            start: datetime.date(),
            end: None,
        });
    }

    None
}

/// Rule 2: a D/M/YYYY date embedded anywhere in the text, day-first.
/// "1/2/2024" is the 1st of February, not January 2nd.
fn try_day_month_year(text: &str) -> Option<ParsedDateRange> {
    for caps in dmy_pattern().captures_iter(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;

        // First match that is a valid calendar date wins
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(ParsedDateRange {
                start: date,
                end: None,
            });
        }
    }
    None
}

/// Rule 3: a month-year range like "Giugno 2023 - Settembre 2023".
///
/// The text is split at the *first* hyphen. If both sides parse as
/// "Mese AAAA" the result spans from the first day of the left month to the
/// last day of the right month; if only the left side parses, the range
/// degenerates to that single month.
fn try_month_range(text: &str) -> Option<ParsedDateRange> {
    let hyphen = text.find('-')?;
    let (left, right) = text.split_at(hyphen);
    let right = &right[1..];

    let (left_year, left_month) = parse_month_year(left)?;
    let start = NaiveDate::from_ymd_opt(left_year, left_month, 1)?;

    if let Some((right_year, right_month)) = parse_month_year(right) {
        let end = last_day_of_month(right_year, right_month)?;
        // A reversed range ("Giugno 2024 - Marzo 2023") degenerates to the
        // left month so that end >= start always holds
        if end >= start {
            return Some(ParsedDateRange {
                start,
                end: Some(end),
            });
        }
    }

    let end = last_day_of_month(left_year, left_month)?;
    Some(ParsedDateRange {
        start,
        end: Some(end),
    })
}

/// Rule 4: the whole text is a single "Mese AAAA", spanning that month.
fn try_month_year(text: &str) -> Option<ParsedDateRange> {
    let (year, month) = parse_month_year(text)?;
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = last_day_of_month(year, month)?;
    Some(ParsedDateRange {
        start,
        end: Some(end),
    })
}

/// Parse "Mese AAAA" (Italian month name plus year), case-insensitive
fn parse_month_year(text: &str) -> Option<(i32, u32)> {
    let mut tokens = text.split_whitespace();
    let month_token = tokens.next()?.to_lowercase();
    let year_token = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    let month = MESI
        .iter()
        .find(|(name, _)| *name == month_token)
        .map(|(_, number)| *number)?;
    let year: i32 = year_token.parse().ok()?;

    Some((year, month))
}

/// Italian name of a month number (1-12), for display
pub fn italian_month_name(month: u32) -> Option<&'static str> {
    MESI.iter()
        .find(|(_, number)| *number == month)
        .map(|(name, _)| *name)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// True when `day` falls inside the parsed date of `text`.
///
/// Ranges match the closed interval `[start, end]`; a precise single date
/// matches only that exact calendar day. Unparseable text never matches.
pub fn matches_day(text: &str, day: NaiveDate) -> bool {
    match parse_date_text(text) {
        Some(ParsedDateRange {
            start,
            end: Some(end),
        }) => day >= start && day <= end,
        Some(ParsedDateRange { start, end: None }) => day == start,
        None => false,
    }
}

/// Filter the initiative collection down to those active on `day`.
/// Input order is preserved; callers pre-sort (by creation time).
pub fn filter_by_day(initiatives: &[Initiative], day: NaiveDate) -> Vec<&Initiative> {
    initiatives
        .iter()
        .filter(|i| matches_day(&i.date, day))
        .collect()
}

/// Choose the calendar day the view should open on.
///
/// Candidates are the parsed start dates of all initiatives (range ends are
/// not candidates). Preference: earliest candidate on or after `today`, else
/// latest candidate before `today`, else the current selection unchanged.
/// Initiatives are long-lived listings, so defaulting to "today" would
/// usually show an empty day.
pub fn pick_default_day(
    initiatives: &[Initiative],
    today: NaiveDate,
    current: Option<NaiveDate>,
) -> Option<NaiveDate> {
    let candidates: Vec<NaiveDate> = initiatives
        .iter()
        .filter_map(|i| parse_date_text(&i.date))
        .map(|range| range.start)
        .collect();

    let earliest_future = candidates.iter().filter(|d| **d >= today).min().copied();
    let latest_past = candidates.iter().filter(|d| **d < today).max().copied();

    earliest_future.or(latest_past).or(current)
}
