//! Manual event dashboard
//!
//! The hands-on counterpart to the chat flow: paste free text, extract one
//! event per line, tweak rows, then approve them into the calendar one at a
//! time. Also manages the upcoming-events window with edit and delete.

use crate::calendar::{CalendarEvent, CalendarGateway, EventInput, EventPatch, GatewayError};
use crate::extractor::{extract_events, parse_time_string, EventStatus, ExtractedEvent};
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use log::debug;
use std::sync::Arc;

const ACTIVITY_CAP: usize = 100;
pub const DEFAULT_UPCOMING_DAYS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Date,
    Time,
}

pub struct DashboardController {
    gateway: Arc<CalendarGateway>,
    timezone: Tz,
    extracted: Vec<ExtractedEvent>,
    upcoming: Vec<CalendarEvent>,
    activity: Vec<String>,
}

impl DashboardController {
    pub fn new(gateway: Arc<CalendarGateway>, timezone: Tz) -> Self {
        Self { gateway, timezone, extracted: Vec::new(), upcoming: Vec::new(), activity: Vec::new() }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    fn add_log(&mut self, entry: impl Into<String>) {
        self.activity.insert(0, entry.into());
        self.activity.truncate(ACTIVITY_CAP);
    }

    pub fn activity(&self) -> &[String] {
        &self.activity
    }

    pub fn extracted(&self) -> &[ExtractedEvent] {
        &self.extracted
    }

    pub fn upcoming(&self) -> &[CalendarEvent] {
        &self.upcoming
    }

    /// One extracted event per non-empty line of the pasted text.
    pub fn extract_all(&mut self, raw: &str) -> usize {
        let today = self.today();
        self.extract_all_on(raw, today)
    }

    pub fn extract_all_on(&mut self, raw: &str, today: NaiveDate) -> usize {
        self.extracted = extract_events(raw, today);
        let count = self.extracted.len();
        self.add_log(format!("Extracted {} events", count));
        count
    }

    pub fn clear_extraction(&mut self) {
        self.extracted.clear();
        self.add_log("Cleared extraction");
    }

    pub fn remove_extracted(&mut self, index: usize) -> Result<()> {
        if index >= self.extracted.len() {
            return Err(anyhow!("No extracted item {}", index));
        }
        self.extracted.remove(index);
        self.add_log("Removed extracted item");
        Ok(())
    }

    /// Edit one field of a pending row. Dates must be `YYYY-MM-DD`, times
    /// anything the extractor's clock grammar accepts.
    pub fn edit_extracted(&mut self, index: usize, field: EditField, value: &str) -> Result<()> {
        let item =
            self.extracted.get_mut(index).ok_or_else(|| anyhow!("No extracted item {}", index))?;
        match field {
            EditField::Title => {
                if value.trim().is_empty() {
                    return Err(anyhow!("Title cannot be empty"));
                }
                item.title = value.trim().to_string();
            }
            EditField::Date => {
                item.date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                    .map_err(|_| anyhow!("Expected date as YYYY-MM-DD, got '{}'", value))?;
            }
            EditField::Time => {
                item.start_time = parse_time_string(value)
                    .ok_or_else(|| anyhow!("Expected time as HH:MM, got '{}'", value))?;
            }
        }
        self.add_log(format!("Edited item {}", index));
        Ok(())
    }

    /// Create one pending row in the calendar. Success flips the row to
    /// Created and records the external id.
    pub async fn approve(&mut self, index: usize) -> Result<String> {
        let event = self
            .extracted
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("No extracted item {}", index))?;
        if event.status == EventStatus::Created {
            return Ok(format!("\"{}\" is already created", event.title));
        }

        self.add_log(format!(
            "Creating \"{}\" on {} {}",
            event.title, event.date, event.start_time
        ));
        let input = EventInput {
            title: event.title.clone(),
            date: event.date,
            start_time: event.start_time.clone(),
            end_time: None,
            notes: None,
        };
        match self.gateway.create_event(&input).await {
            Ok(created) => {
                if let Some(item) = self.extracted.get_mut(index) {
                    item.status = EventStatus::Created;
                    item.created_id = Some(created.id.clone());
                }
                self.add_log(format!("Created ✓ {}", event.title));
                Ok(format!("Created \"{}\"", event.title))
            }
            Err(GatewayError::MissingToken) => {
                self.add_log("No access token — login first");
                Err(anyhow!("No access token; login first"))
            }
            Err(e) => {
                self.add_log(format!("Create failed: {}", e));
                Err(anyhow!("Create failed: {}", e))
            }
        }
    }

    /// Approve every pending row, sequentially to avoid quota bursts,
    /// continuing past individual failures. Returns (created, attempted).
    pub async fn approve_all(&mut self) -> (usize, usize) {
        let mut created = 0;
        let mut attempted = 0;
        for index in 0..self.extracted.len() {
            if self.extracted[index].status == EventStatus::Created {
                continue;
            }
            attempted += 1;
            match self.approve(index).await {
                Ok(_) => created += 1,
                Err(e) => {
                    debug!("Approve {} failed: {}", index, e);
                    // A missing token will fail every row; stop early.
                    if !self.gateway.has_token() {
                        break;
                    }
                }
            }
        }
        (created, attempted)
    }

    /// Refresh the upcoming window: now until `days` ahead.
    pub async fn refresh_upcoming(&mut self, days: u64) -> Result<usize, GatewayError> {
        let now = Utc::now().with_timezone(&self.timezone);
        let end = now + chrono::Duration::days(days as i64);
        let time_min = now.format("%Y-%m-%dT%H:%M:%S%:z").to_string();
        let time_max = end.format("%Y-%m-%dT%H:%M:%S%:z").to_string();

        let items = self.gateway.list_window(&time_min, &time_max).await?;
        let count = items.len();
        self.upcoming = items;
        self.add_log(format!("Loaded {} upcoming events", count));
        Ok(count)
    }

    pub async fn delete_upcoming(&mut self, index: usize) -> Result<String> {
        let event = self
            .upcoming
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("No upcoming event {}", index))?;
        match self.gateway.delete_event(&event.id).await {
            Ok(()) => {
                self.upcoming.remove(index);
                self.add_log("Deleted event");
                Ok(format!("Deleted \"{}\"", event.title()))
            }
            Err(e) => {
                self.add_log(format!("Delete failed: {}", e));
                Err(anyhow!("Delete failed: {}", e))
            }
        }
    }

    pub async fn update_upcoming(
        &mut self,
        index: usize,
        title: Option<String>,
        date: Option<NaiveDate>,
        start_time: Option<String>,
    ) -> Result<String> {
        let event = self
            .upcoming
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("No upcoming event {}", index))?;
        let patch = EventPatch { title, date, start_time, end_time: None, notes: None };
        match self.gateway.update_event(&event.id, &patch).await {
            Ok(updated) => {
                self.add_log("Event updated");
                Ok(format!("Updated \"{}\"", updated.title()))
            }
            Err(e) => {
                self.add_log(format!("Update failed: {}", e));
                Err(anyhow!("Update failed: {}", e))
            }
        }
    }

    /// Create straight from a filled form, bypassing extraction.
    pub async fn create_manual(
        &mut self,
        title: &str,
        date: NaiveDate,
        start_time: &str,
    ) -> Result<String> {
        let start_time = parse_time_string(start_time)
            .ok_or_else(|| anyhow!("Expected time as HH:MM, got '{}'", start_time))?;
        let input = EventInput {
            title: title.to_string(),
            date,
            start_time,
            end_time: None,
            notes: None,
        };
        match self.gateway.create_event(&input).await {
            Ok(created) => {
                self.add_log("Created new event");
                Ok(format!("Created \"{}\"", created.title()))
            }
            Err(e) => {
                self.add_log(format!("Create failed: {}", e));
                Err(anyhow!("Create failed: {}", e))
            }
        }
    }
}
