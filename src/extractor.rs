//! Free-text event extraction
//!
//! Turns lines like "Dentist 15/3/25 3pm" into a title, an ISO date and a
//! 24-hour start time using pattern matching, without calling the model.

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Title used when stripping the date/time tokens leaves nothing behind.
pub const UNTITLED: &str = "Untitled";

/// Start time assumed when a line carries no time token.
pub const DEFAULT_START_TIME: &str = "09:00";

static TIME_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2}(?::\d{2})?\s*(?:am|pm)?|noon|midnight)\b").unwrap()
});

static DATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(today|tomorrow|tonight|\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?)\b").unwrap()
});

static TIME_PARSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").unwrap());

static DMY_PARSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})(?:[/-](\d{2,4}))?$").unwrap());

static MULTI_EVENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([^,\n]+?)\s*,\s*(\d{1,2}/\d{1,2}/\d{2,4})\s*,\s*(\d{1,2}:\d{2})").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Created,
}

/// One event extracted from one line of free text. Lives only in session
/// state; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEvent {
    pub title: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub status: EventStatus,
    pub created_id: Option<String>,
}

impl ExtractedEvent {
    fn new(title: String, date: NaiveDate, start_time: String) -> Self {
        Self { title, date, start_time, status: EventStatus::Pending, created_id: None }
    }
}

/// Normalize a clock string to 24-hour "HH:MM". Bare hours get minute 00 and
/// no meridiem adjustment; 12am maps to 00:00 and 12pm stays 12:00.
pub fn parse_time_string(time_str: &str) -> Option<String> {
    let s = time_str.trim().to_lowercase();
    let caps = TIME_PARSE.captures(&s)?;

    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    match caps.get(3).map(|m| m.as_str()) {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }

    if hour < 24 && minute < 60 {
        Some(format!("{:02}:{:02}", hour, minute))
    } else {
        None
    }
}

/// Resolve a date token against `today`. Relative words resolve directly;
/// `D/M[/YY[YY]]` takes the current year when absent and 2000+YY for
/// two-digit years. Invalid calendar dates yield `None`.
pub fn parse_date_word(word: &str, today: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;

    let w = word.trim().to_lowercase();
    if w == "today" || w == "tonight" {
        return Some(today);
    }
    if w == "tomorrow" {
        return today.checked_add_days(Days::new(1));
    }

    let caps = DMY_PARSE.captures(&w)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let mut year: i32 = caps.get(3).map_or(Ok(today.year()), |m| m.as_str().parse()).ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// A time candidate glued to a date separator or another digit belongs to a
/// date token ("15" in "15/3/25"), not to the clock.
fn is_time_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let date_glue = |c: char| c == '/' || c == '-' || c == ':' || c.is_ascii_digit();
    !before.is_some_and(date_glue) && !after.is_some_and(date_glue)
}

/// Extract a best-effort event from one line. A line with no recognizable
/// tokens still yields a full event: today, 09:00, the whole line as title.
pub fn extract_event_from_line(line: &str, today: NaiveDate) -> ExtractedEvent {
    let mut title = line.trim().to_string();
    let mut time: Option<String> = None;
    let mut date: Option<NaiveDate> = None;

    let time_hit = TIME_TOKEN.find_iter(&title).find_map(|m| {
        if !is_time_boundary(&title, m.start(), m.end()) {
            return None;
        }
        let normalized = match m.as_str().to_lowercase().as_str() {
            "noon" => parse_time_string("12:00"),
            "midnight" => parse_time_string("00:00"),
            other => parse_time_string(other),
        };
        normalized.map(|t| (m.range(), t))
    });
    if let Some((range, t)) = time_hit {
        time = Some(t);
        title.replace_range(range, "");
    }

    let date_hit = DATE_TOKEN
        .find(&title)
        .and_then(|m| parse_date_word(m.as_str(), today).map(|d| (m.range(), d)));
    if let Some((range, d)) = date_hit {
        date = Some(d);
        title.replace_range(range, "");
    }

    let title = title
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ',' | ':'))
        .to_string();
    let title = if title.is_empty() { UNTITLED.to_string() } else { title };

    ExtractedEvent::new(
        title,
        date.unwrap_or(today),
        time.unwrap_or_else(|| DEFAULT_START_TIME.to_string()),
    )
}

/// One event per non-empty line. Feeds the dashboard's paste-and-extract flow.
pub fn extract_events(raw: &str, today: NaiveDate) -> Vec<ExtractedEvent> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| extract_event_from_line(l, today))
        .collect()
}

/// The stricter batch pattern: `title, D/M/YYYY, HH:MM`, repeated. A match
/// here means the message is a bulk create and the model is never consulted.
/// Entries whose date or time fail to normalize are skipped.
pub fn parse_multiple_events(text: &str, today: NaiveDate) -> Vec<ExtractedEvent> {
    MULTI_EVENT
        .captures_iter(text)
        .filter_map(|caps| {
            let title = caps.get(1)?.as_str().trim();
            let date = parse_date_word(caps.get(2)?.as_str(), today)?;
            let time = parse_time_string(caps.get(3)?.as_str())?;
            Some(ExtractedEvent::new(title.to_string(), date, time))
        })
        .collect()
}
