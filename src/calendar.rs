//! Google Calendar gateway
//!
//! Thin wrapper over the Calendar v3 REST API: create, list, patch and
//! delete events on one calendar with a caller-supplied bearer token.
//! Expected failures (missing token, transport, non-success status) are
//! values of [`GatewayError`]; callers turn them into user-visible
//! messages. Timestamps are fixed-offset strings for the configured zone.

use crate::auth::TokenStore;
use chrono::NaiveDate;
use log::debug;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no calendar access token")]
    MissingToken,
    #[error("calendar request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("calendar API returned status {0}")]
    Status(StatusCode),
    #[error("unexpected calendar API response: {0}")]
    UnexpectedBody(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Start or end of an event: timed events carry `dateTime`, all-day events
/// carry `date`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    /// Best display form: the timed stamp, else the all-day date.
    pub fn display(&self) -> String {
        self.date_time.clone().or_else(|| self.date.clone()).unwrap_or_default()
    }
}

/// Transient mirror of an event owned by the external calendar service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
}

impl CalendarEvent {
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("Untitled")
    }

    pub fn start_display(&self) -> String {
        self.start.as_ref().map(EventTime::display).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarList {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

/// Fields for a create call. Missing end time defaults to start + 1 hour.
#[derive(Debug, Clone)]
pub struct EventInput {
    pub title: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub notes: Option<String>,
}

/// Partial fields for a patch call; start/end are rebuilt only when a date
/// and a start time are both present.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub notes: Option<String>,
}

fn parse_hm(hm: &str) -> Option<(u32, u32)> {
    let mut parts = hm.splitn(2, ':');
    let hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = match parts.next() {
        Some(m) => m.trim().parse().ok()?,
        None => 0,
    };
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Combine a calendar date and a clock time into a fixed-offset timestamp,
/// e.g. `2025-03-15T15:00:00+05:30`.
pub fn make_rfc3339(date: NaiveDate, time_hm: &str, offset: &str) -> String {
    let (hour, minute) = parse_hm(time_hm).unwrap_or((9, 0));
    format!("{}T{:02}:{:02}:00{}", date.format("%Y-%m-%d"), hour, minute, offset)
}

/// Clock arithmetic only: the hour wraps at midnight and the date component
/// is never advanced. "23:30" becomes "00:30".
pub fn add_one_hour(hm: &str) -> String {
    let (hour, minute) = parse_hm(hm).unwrap_or((9, 0));
    format!("{:02}:{:02}", (hour + 1) % 24, minute)
}

pub struct CalendarGateway {
    client: Client,
    api_base: String,
    calendar_id: String,
    timezone: String,
    utc_offset: String,
    tokens: Arc<TokenStore>,
}

impl CalendarGateway {
    pub fn new(
        api_base: Option<&str>,
        calendar_id: &str,
        timezone: &str,
        utc_offset: &str,
        tokens: Arc<TokenStore>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/').to_string(),
            calendar_id: calendar_id.to_string(),
            timezone: timezone.to_string(),
            utc_offset: utc_offset.to_string(),
            tokens,
        }
    }

    pub fn utc_offset(&self) -> &str {
        &self.utc_offset
    }

    pub fn has_token(&self) -> bool {
        self.tokens.is_signed_in()
    }

    fn bearer(&self) -> GatewayResult<String> {
        let token = self.tokens.get().ok_or(GatewayError::MissingToken)?;
        Ok(format!("Bearer {}", token.expose_secret()))
    }

    fn events_url(&self, event_id: Option<&str>) -> GatewayResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| GatewayError::UnexpectedBody(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GatewayError::UnexpectedBody("bad api base".to_string()))?;
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn event_body(&self, input: &EventInput) -> serde_json::Value {
        let start = make_rfc3339(input.date, &input.start_time, &self.utc_offset);
        let end_time =
            input.end_time.clone().unwrap_or_else(|| add_one_hour(&input.start_time));
        let end = make_rfc3339(input.date, &end_time, &self.utc_offset);
        serde_json::json!({
            "summary": input.title,
            "description": input.notes.clone().unwrap_or_default(),
            "start": { "dateTime": start, "timeZone": self.timezone },
            "end": { "dateTime": end, "timeZone": self.timezone },
        })
    }

    pub async fn create_event(&self, input: &EventInput) -> GatewayResult<CalendarEvent> {
        let auth = self.bearer()?;
        let url = self.events_url(None)?;
        debug!("Creating event '{}' on {}", input.title, input.date);

        let response = self
            .client
            .post(url)
            .header("Authorization", auth)
            .json(&self.event_body(input))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }
        let created: CalendarEvent = response.json().await?;
        if created.id.is_empty() {
            return Err(GatewayError::UnexpectedBody("created event has no id".to_string()));
        }
        Ok(created)
    }

    /// Events within one calendar day of the configured zone, recurring
    /// events expanded, ordered by start time.
    pub async fn list_events_on(&self, date: NaiveDate) -> GatewayResult<Vec<CalendarEvent>> {
        let time_min = format!("{}T00:00:00{}", date.format("%Y-%m-%d"), self.utc_offset);
        let time_max = format!("{}T23:59:59{}", date.format("%Y-%m-%d"), self.utc_offset);
        self.list_window(&time_min, &time_max).await
    }

    pub async fn list_window(
        &self,
        time_min: &str,
        time_max: &str,
    ) -> GatewayResult<Vec<CalendarEvent>> {
        let auth = self.bearer()?;
        let mut url = self.events_url(None)?;
        url.query_pairs_mut()
            .append_pair("timeMin", time_min)
            .append_pair("timeMax", time_max)
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let response = self.client.get(url).header("Authorization", auth).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }
        let list: EventList = response.json().await?;
        Ok(list.items)
    }

    pub async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> GatewayResult<CalendarEvent> {
        let auth = self.bearer()?;
        let url = self.events_url(Some(event_id))?;

        let mut body = serde_json::Map::new();
        if let Some(title) = &patch.title {
            body.insert("summary".to_string(), serde_json::json!(title));
        }
        if let Some(notes) = &patch.notes {
            body.insert("description".to_string(), serde_json::json!(notes));
        }
        if let (Some(date), Some(start_time)) = (patch.date, patch.start_time.as_deref()) {
            let end_time = patch.end_time.clone().unwrap_or_else(|| add_one_hour(start_time));
            body.insert(
                "start".to_string(),
                serde_json::json!({
                    "dateTime": make_rfc3339(date, start_time, &self.utc_offset),
                    "timeZone": self.timezone,
                }),
            );
            body.insert(
                "end".to_string(),
                serde_json::json!({
                    "dateTime": make_rfc3339(date, &end_time, &self.utc_offset),
                    "timeZone": self.timezone,
                }),
            );
        }

        let response = self
            .client
            .patch(url)
            .header("Authorization", auth)
            .json(&serde_json::Value::Object(body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }
        Ok(response.json().await?)
    }

    /// The transport signals success with 204 No Content; anything else is
    /// a failure.
    pub async fn delete_event(&self, event_id: &str) -> GatewayResult<()> {
        let auth = self.bearer()?;
        let url = self.events_url(Some(event_id))?;

        let response = self.client.delete(url).header("Authorization", auth).send().await?;
        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(GatewayError::Status(status));
        }
        Ok(())
    }

    pub async fn list_calendars(&self) -> GatewayResult<Vec<CalendarListEntry>> {
        let auth = self.bearer()?;
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| GatewayError::UnexpectedBody(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::UnexpectedBody("bad api base".to_string()))?
            .extend(["users", "me", "calendarList"]);

        let response = self.client.get(url).header("Authorization", auth).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }
        let list: CalendarList = response.json().await?;
        Ok(list.items)
    }
}
