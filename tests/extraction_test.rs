//! Scenario tests for the free-text extraction pipeline.

use chrono::NaiveDate;
use fig::calendar::add_one_hour;
use fig::extractor::{
    extract_event_from_line, parse_multiple_events, EventStatus, DEFAULT_START_TIME,
};
use test_case::test_case;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn dentist_line_end_to_end() {
    let ev = extract_event_from_line("Dentist 15/3/25 3pm", date(2025, 3, 1));
    assert_eq!(ev.title, "Dentist");
    assert_eq!(ev.date, date(2025, 3, 15));
    assert_eq!(ev.start_time, "15:00");
    assert_eq!(ev.status, EventStatus::Pending);
}

#[test]
fn line_without_tokens_gets_defaults() {
    let today = date(2025, 3, 1);
    let ev = extract_event_from_line("Water the plants slowly", today);
    assert_eq!(ev.date, today);
    assert_eq!(ev.start_time, DEFAULT_START_TIME);
    assert_eq!(ev.title, "Water the plants slowly");
}

#[test_case("Lunch 1/4/25 12pm", "Lunch", 2025, 4, 1, "12:00"; "noon meridiem")]
#[test_case("Call 2/4/25 12am", "Call", 2025, 4, 2, "00:00"; "midnight meridiem")]
#[test_case("Review 28/2/25 9:15am", "Review", 2025, 2, 28, "09:15"; "morning with minutes")]
#[test_case("Wrap-up 31/12/25 11:59pm", "Wrap-up", 2025, 12, 31, "23:59"; "last minute of the year")]
fn date_and_time_tokens_are_removed_and_normalized(
    line: &str,
    title: &str,
    y: i32,
    m: u32,
    d: u32,
    time: &str,
) {
    let ev = extract_event_from_line(line, date(2025, 1, 1));
    assert_eq!(ev.title, title);
    assert_eq!(ev.date, date(y, m, d));
    assert_eq!(ev.start_time, time);
}

#[test]
fn batch_text_yields_two_create_requests() {
    let text = "Gym, 20/6/2025, 06:00\nCall mom, 21/6/2025, 18:30";
    let events = parse_multiple_events(text, date(2025, 3, 1));

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].title, "Gym");
    assert_eq!(events[0].date, date(2025, 6, 20));
    assert_eq!(events[0].start_time, "06:00");
    assert_eq!(events[1].title, "Call mom");
    assert_eq!(events[1].date, date(2025, 6, 21));
    assert_eq!(events[1].start_time, "18:30");
}

#[test]
fn add_one_hour_wraps_without_date_rollover() {
    assert_eq!(add_one_hour("09:00"), "10:00");
    assert_eq!(add_one_hour("23:30"), "00:30");
}
