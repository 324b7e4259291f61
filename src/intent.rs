//! Scheduling-intent parsing
//!
//! Sends the user's message to the text model together with the resolved
//! today/tomorrow dates and turns the reply into a [`SchedulingIntent`].
//! Model output is prose-tolerant: the first `{` through the last `}` is
//! treated as the JSON payload. Anything that fails to parse or validate
//! collapses to [`SchedulingIntent::None`]; this path never returns an error.

use crate::ai::{sanitize_user_input, TextModel};
use crate::extractor::parse_time_string;
use anyhow::Result;
use chrono::NaiveDate;
use log::debug;
use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const MAX_INPUT_LEN: usize = 1000;

static HHMM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap());

/// Structured action inferred from one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingIntent {
    CreateEvent {
        title: Option<String>,
        date: Option<NaiveDate>,
        start_time: Option<String>,
        end_time: Option<String>,
        notes: Option<String>,
    },
    ShowEvents {
        date: Option<NaiveDate>,
    },
    DeleteEvent {
        title: Option<String>,
        date: Option<NaiveDate>,
    },
    UpdateEvent {
        event_id: Option<String>,
        title: Option<String>,
        date: Option<NaiveDate>,
        start_time: Option<String>,
        end_time: Option<String>,
        notes: Option<String>,
    },
    PlanDay {
        date: Option<NaiveDate>,
    },
    None,
}

/// Wire shape the model is asked to produce. All fields optional; the
/// strict step below decides what survives.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawIntent {
    intent: Option<String>,
    title: Option<String>,
    date: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    event_id: Option<String>,
    #[allow(dead_code)]
    query: Option<String>,
    notes: Option<String>,
}

/// One entry of a plan-day schedule array.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlanSlot {
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Locate the first `{` and the last `}` and return the span between them,
/// inclusive. Generative output may wrap the payload in prose; the contract
/// assumes exactly one object is embedded.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let first = raw.find('{')?;
    let last = raw.rfind('}')?;
    if last < first {
        return None;
    }
    Some(&raw[first..=last])
}

/// Same scan for a JSON array payload (plan-day schedules).
pub fn extract_json_array(raw: &str) -> Option<&str> {
    let first = raw.find('[')?;
    let last = raw.rfind(']')?;
    if last < first {
        return None;
    }
    Some(&raw[first..=last])
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Strict date check: `YYYY-MM-DD` or the field is a schema violation.
fn valid_date(value: Option<String>) -> Result<Option<NaiveDate>, ()> {
    match non_empty(value) {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map(Some).map_err(|_| ()),
        None => Ok(None),
    }
}

/// Strict clock check: `H:MM`/`HH:MM`, normalized to zero-padded form.
fn valid_time(value: Option<String>) -> Result<Option<String>, ()> {
    match non_empty(value) {
        Some(s) => {
            if !HHMM.is_match(&s) {
                return Err(());
            }
            parse_time_string(&s).map(Some).ok_or(())
        }
        None => Ok(None),
    }
}

/// Parse-and-validate: any schema violation rejects the whole message down
/// to `None` rather than acting on a half-understood intent.
fn validate(raw: RawIntent) -> SchedulingIntent {
    let result = (|| -> Result<SchedulingIntent, ()> {
        let intent = match raw.intent.as_deref() {
            Some("create_event") => SchedulingIntent::CreateEvent {
                title: non_empty(raw.title),
                date: valid_date(raw.date)?,
                start_time: valid_time(raw.start_time)?,
                end_time: valid_time(raw.end_time)?,
                notes: non_empty(raw.notes),
            },
            Some("show_events") => SchedulingIntent::ShowEvents { date: valid_date(raw.date)? },
            Some("delete_event") => SchedulingIntent::DeleteEvent {
                title: non_empty(raw.title),
                date: valid_date(raw.date)?,
            },
            Some("update_event") => SchedulingIntent::UpdateEvent {
                event_id: non_empty(raw.event_id),
                title: non_empty(raw.title),
                date: valid_date(raw.date)?,
                start_time: valid_time(raw.start_time)?,
                end_time: valid_time(raw.end_time)?,
                notes: non_empty(raw.notes),
            },
            Some("plan_day") => SchedulingIntent::PlanDay { date: valid_date(raw.date)? },
            Some("none") => SchedulingIntent::None,
            _ => return Err(()),
        };
        Ok(intent)
    })();

    result.unwrap_or(SchedulingIntent::None)
}

/// Parses user messages into scheduling intents via the text model.
pub struct IntentParser {
    model: Arc<dyn TextModel>,
    assistant_name: String,
    timezone: String,
    cache: Mutex<LruCache<String, SchedulingIntent>>,
}

impl IntentParser {
    pub fn new(model: Arc<dyn TextModel>, assistant_name: &str, timezone: &str) -> Self {
        Self {
            model,
            assistant_name: assistant_name.to_string(),
            timezone: timezone.to_string(),
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(100).unwrap())),
        }
    }

    fn build_prompt(&self, user_text: &str, today: NaiveDate, tomorrow: NaiveDate) -> String {
        format!(
            r#"Today ({tz}): {today}
Tomorrow ({tz}): {tomorrow}

You MUST base date interpretations on these values.

You are {name}, a helpful assistant. Parse the user's message and return STRICT JSON only with this schema:

{{ "intent": "create_event" | "show_events" | "delete_event" | "update_event" | "plan_day" | "none",
  "title": string or null,
  "date": "YYYY-MM-DD" or null,
  "startTime": "HH:MM" or null,
  "endTime": "HH:MM" or null,
  "eventId": string or null,
  "query": string or null,
  "notes": string or null }}

Interpret natural language dates and times (tomorrow, next monday, tonight, 6pm) using the {tz} timezone. If no scheduling intent, return {{"intent":"none"}}.

User message:
"""{text}"""
"#,
            tz = self.timezone,
            today = today.format("%Y-%m-%d"),
            tomorrow = tomorrow.format("%Y-%m-%d"),
            name = self.assistant_name,
            text = user_text,
        )
    }

    /// Single best-effort model call per message, no retry. Every failure
    /// mode (model error, no braces, bad JSON, schema violation) degrades
    /// to `SchedulingIntent::None`.
    pub async fn parse(
        &self,
        user_text: &str,
        today: NaiveDate,
        tomorrow: NaiveDate,
    ) -> SchedulingIntent {
        let mut text = sanitize_user_input(user_text);
        if text.len() > MAX_INPUT_LEN {
            debug!("Truncating over-long user message ({} chars)", text.len());
            let mut end = MAX_INPUT_LEN;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        // Date context is part of the key so cached parses expire with the day.
        let cache_key = format!("{}|{}", today, text);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&cache_key) {
                debug!("Using cached intent for: {}", text);
                return cached.clone();
            }
        }

        let prompt = self.build_prompt(&text, today, tomorrow);
        let raw = match self.model.generate_content(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Intent model call failed: {}", e);
                return SchedulingIntent::None;
            }
        };

        let intent = match extract_json_object(&raw) {
            Some(json_text) => match serde_json::from_str::<RawIntent>(json_text) {
                Ok(parsed) => validate(parsed),
                Err(e) => {
                    debug!("Intent JSON parse failed: {} in {}", e, json_text);
                    SchedulingIntent::None
                }
            },
            None => SchedulingIntent::None,
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(cache_key, intent.clone());
        }

        intent
    }
}

/// Parse a plan-day reply into schedule slots. Entries missing any of
/// title/start/end, or whose clock values don't normalize, are skipped.
pub fn parse_plan_schedule(raw: &str) -> Vec<PlanSlot> {
    let Some(json_text) = extract_json_array(raw) else {
        return Vec::new();
    };
    let entries: Vec<serde_json::Value> = match serde_json::from_str(json_text) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Plan schedule parse failed: {}", e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<PlanSlot>(entry).ok())
        .filter_map(|slot| {
            let start = parse_time_string(&slot.start)?;
            let end = parse_time_string(&slot.end)?;
            Some(PlanSlot { start, end, ..slot })
        })
        .filter(|slot| !slot.title.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeModel {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Some(reply.to_string()), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { reply: None, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl TextModel for FakeModel {
        async fn generate_content(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| anyhow!("model unavailable"))
        }
    }

    fn dates() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap(),
        )
    }

    fn parser(model: Arc<dyn TextModel>) -> IntentParser {
        IntentParser::new(model, "FiG", "Asia/Kolkata")
    }

    #[test]
    fn test_extract_json_object_with_prose() {
        let raw = "Sure! Here is the JSON you asked for:\n{\"intent\":\"none\"}\nHope that helps.";
        assert_eq!(extract_json_object(raw), Some("{\"intent\":\"none\"}"));
    }

    #[test]
    fn test_extract_json_object_absent() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[tokio::test]
    async fn test_parse_create_event() {
        let model = FakeModel::replying(
            r#"Here you go: {"intent":"create_event","title":"Gym","date":"2025-03-02","startTime":"18:00","endTime":null,"eventId":null,"query":null,"notes":null}"#,
        );
        let (today, tomorrow) = dates();
        let intent = parser(model).parse("add gym tomorrow 6pm", today, tomorrow).await;
        assert_eq!(
            intent,
            SchedulingIntent::CreateEvent {
                title: Some("Gym".to_string()),
                date: Some(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()),
                start_time: Some("18:00".to_string()),
                end_time: None,
                notes: None,
            }
        );
    }

    #[tokio::test]
    async fn test_parse_no_braces_is_none() {
        let (today, tomorrow) = dates();
        let intent = parser(FakeModel::replying("I could not find any scheduling request."))
            .parse("hello", today, tomorrow)
            .await;
        assert_eq!(intent, SchedulingIntent::None);
    }

    #[tokio::test]
    async fn test_parse_model_failure_is_none() {
        let (today, tomorrow) = dates();
        let intent = parser(FakeModel::failing()).parse("hello", today, tomorrow).await;
        assert_eq!(intent, SchedulingIntent::None);
    }

    #[tokio::test]
    async fn test_parse_malformed_json_is_none() {
        let (today, tomorrow) = dates();
        let intent = parser(FakeModel::replying("{\"intent\": \"create_event\", }"))
            .parse("add gym", today, tomorrow)
            .await;
        assert_eq!(intent, SchedulingIntent::None);
    }

    #[tokio::test]
    async fn test_unknown_intent_tag_is_none() {
        let (today, tomorrow) = dates();
        let intent = parser(FakeModel::replying(r#"{"intent":"reschedule_event","title":"Gym"}"#))
            .parse("move gym", today, tomorrow)
            .await;
        assert_eq!(intent, SchedulingIntent::None);
    }

    #[tokio::test]
    async fn test_invalid_date_rejects_whole_intent() {
        let (today, tomorrow) = dates();
        let intent = parser(FakeModel::replying(
            r#"{"intent":"show_events","date":"next tuesday"}"#,
        ))
        .parse("what's on next tuesday", today, tomorrow)
        .await;
        assert_eq!(intent, SchedulingIntent::None);
    }

    #[tokio::test]
    async fn test_parse_caches_per_day() {
        let model = FakeModel::replying(r#"{"intent":"show_events","date":"2025-03-01"}"#);
        let parser = parser(model.clone());
        let (today, tomorrow) = dates();

        let first = parser.parse("what's on today", today, tomorrow).await;
        let second = parser.parse("what's on today", today, tomorrow).await;
        assert_eq!(first, second);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_plan_schedule() {
        let raw = r#"Here is a calm day:
[
  {"title":"Morning walk","start":"7:00","end":"8:00","notes":""},
  {"title":"","start":"09:00","end":"10:00"},
  {"title":"Deep work","start":"10:00","end":"12:00"},
  {"title":"No end time","start":"13:00"}
]"#;
        let slots = parse_plan_schedule(raw);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].title, "Morning walk");
        assert_eq!(slots[0].start, "07:00");
        assert_eq!(slots[1].title, "Deep work");
    }

    #[test]
    fn test_parse_plan_schedule_no_array() {
        assert!(parse_plan_schedule("try a walk and some reading").is_empty());
    }
}
