//! Conversation orchestration
//!
//! One pass per user message: decide whether the calendar is involved, try
//! the local multi-event pattern, fall back to the AI intent parser, then
//! dispatch. Every branch ends with a rendered reply; long calls get a
//! transient "thinking" placeholder that is replaced once the result lands.

use crate::ai::{clean_reply, TextModel};
use crate::auth::TokenStore;
use crate::calendar::{CalendarGateway, CalendarEvent, EventInput, EventPatch, GatewayError};
use crate::config::Config;
use crate::extractor::parse_multiple_events;
use crate::intent::{parse_plan_schedule, IntentParser, SchedulingIntent};
use crate::tasks::TaskStore;
use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

const LOGIN_NUDGE: &str = "🙏 Please login with Google first so I can access your calendar.";

static CALENDAR_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(events?|today|tomorrow|add event|show events|what's on)\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

pub struct ConversationController {
    model: Arc<dyn TextModel>,
    parser: IntentParser,
    gateway: Arc<CalendarGateway>,
    tasks: Arc<TaskStore>,
    tokens: Arc<TokenStore>,
    assistant_name: String,
    display_name: String,
    user_id: String,
    timezone: Tz,
    messages: Vec<ChatMessage>,
    summary_pushed_for: Option<NaiveDate>,
}

impl ConversationController {
    pub fn new(
        config: &Config,
        model: Arc<dyn TextModel>,
        gateway: Arc<CalendarGateway>,
        tasks: Arc<TaskStore>,
        tokens: Arc<TokenStore>,
    ) -> Self {
        let timezone: Tz = config.timezone().parse().unwrap_or_else(|_| {
            warn!("Unknown timezone '{}', falling back to Asia/Kolkata", config.timezone());
            chrono_tz::Asia::Kolkata
        });
        let parser = IntentParser::new(model.clone(), &config.assistant_name(), &config.timezone());
        let user_id = config
            .assistant
            .user_email
            .clone()
            .unwrap_or_else(|| "local-user".to_string());

        Self {
            model,
            parser,
            gateway,
            tasks,
            tokens,
            assistant_name: config.assistant_name(),
            display_name: config.display_name(),
            user_id,
            timezone,
            messages: Vec::new(),
            summary_pushed_for: None,
        }
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    fn push_user(&mut self, text: &str) {
        self.messages.push(ChatMessage { sender: Sender::User, text: text.to_string() });
    }

    fn push_bot(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage { sender: Sender::Bot, text: text.into() });
    }

    /// Transient placeholder shown while a slow call is in flight.
    fn begin_thinking(&mut self, text: &str) {
        self.push_bot(text);
    }

    /// Replace the placeholder with the real reply.
    fn finish_thinking(&mut self, text: impl Into<String>) {
        self.messages.pop();
        self.push_bot(text);
    }

    fn gateway_failure(&self, action: &str, err: GatewayError) -> String {
        match err {
            GatewayError::MissingToken => LOGIN_NUDGE.to_string(),
            other => {
                error!("Calendar {} failed: {}", action, other);
                format!("I couldn't {} right now.", action)
            }
        }
    }

    fn pretty_start(event: &CalendarEvent) -> String {
        let start = event.start_display();
        match start.split_once('T') {
            Some((date, time)) => format!("{} {}", date, &time[..time.len().min(5)]),
            None => start,
        }
    }

    /// Session-opening bubble: the gentle task, the streak, and (when a
    /// token is present) today's events, pushed at most once per date.
    pub async fn greet(&mut self) -> Vec<String> {
        let mark = self.messages.len();
        let today = self.today();

        match self
            .tasks
            .get_or_create_today_task(&self.user_id, &self.display_name, today)
            .await
        {
            Ok(task) => {
                let streak = self
                    .tasks
                    .current_streak(&self.user_id)
                    .await
                    .map(|s| s.current_streak)
                    .unwrap_or(0);
                self.push_bot(format!(
                    "🌿 Today's Gentle Task\n{}\nStreak: {} days",
                    task.task, streak
                ));
            }
            Err(e) => {
                error!("Failed to load daily task: {}", e);
                self.push_bot("I couldn't fetch your gentle task today.");
            }
        }

        if self.tokens.is_signed_in() {
            self.push_summary(today).await;
        }

        self.bot_texts_since(mark)
    }

    /// Post-login confirmation plus the day summary.
    pub async fn after_login(&mut self) -> Vec<String> {
        let mark = self.messages.len();
        self.push_bot("🙏 Logged in. I can now manage your schedule.");
        let today = self.today();
        self.push_summary(today).await;
        self.bot_texts_since(mark)
    }

    async fn push_summary(&mut self, today: NaiveDate) {
        if self.summary_pushed_for == Some(today) {
            return;
        }
        match self.gateway.list_events_on(today).await {
            Ok(items) => {
                let mut out = format!("📅 {}'s Today\n", self.display_name);
                if items.is_empty() {
                    out.push_str("No events for today.");
                } else {
                    for event in &items {
                        out.push_str(&format!(
                            "• {} — {}\n",
                            Self::pretty_start(event),
                            event.title()
                        ));
                    }
                }
                self.push_bot(out.trim_end().to_string());
                self.summary_pushed_for = Some(today);
            }
            Err(e) => {
                let reply = self.gateway_failure("load today's events", e);
                self.push_bot(reply);
            }
        }
    }

    fn bot_texts_since(&self, mark: usize) -> Vec<String> {
        self.messages[mark..]
            .iter()
            .filter(|m| m.sender == Sender::Bot)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Handle one user message end to end and return the bot replies it
    /// produced.
    pub async fn handle_message(&mut self, user_text: &str) -> Vec<String> {
        let today = self.today();
        self.handle_message_on(user_text, today).await
    }

    pub async fn handle_message_on(&mut self, user_text: &str, today: NaiveDate) -> Vec<String> {
        let mark = self.messages.len();
        self.push_user(user_text);

        // Asking about the calendar without a token gets a login nudge, not
        // a doomed API call.
        if CALENDAR_KEYWORDS.is_match(user_text) && !self.tokens.is_signed_in() {
            self.push_bot(LOGIN_NUDGE);
            return self.bot_texts_since(mark);
        }

        // The quick comma pattern means bulk create; the model never sees it.
        let batch = parse_multiple_events(user_text, today);
        if !batch.is_empty() {
            self.push_bot("Creating multiple events…");
            let mut created_count = 0;
            for event in &batch {
                let input = EventInput {
                    title: event.title.clone(),
                    date: event.date,
                    start_time: event.start_time.clone(),
                    end_time: None,
                    notes: None,
                };
                match self.gateway.create_event(&input).await {
                    Ok(created) => {
                        created_count += 1;
                        self.push_bot(format!(
                            "🙏 Event {} added on {} at {}.",
                            created.title(),
                            event.date,
                            event.start_time
                        ));
                    }
                    Err(e) => {
                        debug!("Batch create failed for '{}': {}", event.title, e);
                        self.push_bot(format!(
                            "Couldn't create event: {}, {}, {}.",
                            event.title, event.date, event.start_time
                        ));
                    }
                }
            }
            self.push_bot(format!("Created {}/{} events.", created_count, batch.len()));
            return self.bot_texts_since(mark);
        }

        self.begin_thinking("Let me think…");
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        let intent = self.parser.parse(user_text, today, tomorrow).await;
        debug!("Parsed intent: {:?}", intent);

        match intent {
            SchedulingIntent::None => {
                self.messages.pop();
                self.reply_in_persona(user_text, today).await;
            }
            SchedulingIntent::CreateEvent { title, date, start_time, end_time, notes } => {
                let (Some(title), Some(date), Some(start_time)) = (title, date, start_time)
                else {
                    self.finish_thinking(
                        "I need a title, date and start time to create an event. \
                         Can you provide them?",
                    );
                    return self.bot_texts_since(mark);
                };
                self.finish_thinking("Creating your event…");
                let input = EventInput { title, date, start_time, end_time, notes };
                match self.gateway.create_event(&input).await {
                    Ok(created) => self.push_bot(format!(
                        "🙏 Event {} added on {} at {}.",
                        created.title(),
                        input.date,
                        input.start_time
                    )),
                    Err(e) => {
                        let reply = self.gateway_failure("create the event", e);
                        self.push_bot(reply);
                    }
                }
            }
            SchedulingIntent::ShowEvents { date } => {
                let date = date.unwrap_or(today);
                self.finish_thinking("Fetching events…");
                match self.gateway.list_events_on(date).await {
                    Ok(items) if items.is_empty() => {
                        self.push_bot(format!("You have no events on {}.", date));
                    }
                    Ok(items) => {
                        let mut out = format!("Events on {}:\n", date);
                        for event in &items {
                            out.push_str(&format!(
                                "• {} — {}\n",
                                event.title(),
                                Self::pretty_start(event)
                            ));
                        }
                        self.push_bot(out.trim_end().to_string());
                    }
                    Err(e) => {
                        let reply = self.gateway_failure("fetch events", e);
                        self.push_bot(reply);
                    }
                }
            }
            SchedulingIntent::DeleteEvent { title, date } => {
                let date = date.unwrap_or(today);
                self.finish_thinking("Searching for event to delete…");
                match self.find_event(title.as_deref(), date).await {
                    Ok(Some(found)) => match self.gateway.delete_event(&found.id).await {
                        Ok(()) => self.push_bot(format!("Deleted {}.", found.title())),
                        Err(e) => {
                            let reply = self.gateway_failure("delete the event", e);
                            self.push_bot(reply);
                        }
                    },
                    Ok(None) => self.push_bot(
                        "I couldn't locate that event. Try giving exact title or event date.",
                    ),
                    Err(e) => {
                        let reply = self.gateway_failure("search your events", e);
                        self.push_bot(reply);
                    }
                }
            }
            SchedulingIntent::UpdateEvent { event_id, title, date, start_time, end_time, notes } => {
                self.finish_thinking("Locating event to update…");
                let patch = EventPatch { title: title.clone(), date, start_time, end_time, notes };
                let target = match event_id {
                    Some(id) => Some(id),
                    None => {
                        let lookup_date = date.unwrap_or(today);
                        match self.find_event(title.as_deref(), lookup_date).await {
                            Ok(found) => found.map(|ev| ev.id),
                            Err(e) => {
                                let reply = self.gateway_failure("search your events", e);
                                self.push_bot(reply);
                                return self.bot_texts_since(mark);
                            }
                        }
                    }
                };
                match target {
                    Some(id) => match self.gateway.update_event(&id, &patch).await {
                        Ok(updated) => {
                            self.push_bot(format!("Updated {}.", updated.title()));
                        }
                        Err(e) => {
                            let reply = self.gateway_failure("update the event", e);
                            self.push_bot(reply);
                        }
                    },
                    None => self.push_bot("Couldn't find the event to update."),
                }
            }
            SchedulingIntent::PlanDay { date } => {
                let date = date.unwrap_or(today);
                self.finish_thinking("Planning your day…");
                self.plan_day(date).await;
            }
        }

        self.bot_texts_since(mark)
    }

    /// Case-insensitive substring match on the title within one day's events.
    async fn find_event(
        &self,
        title: Option<&str>,
        date: NaiveDate,
    ) -> Result<Option<CalendarEvent>, GatewayError> {
        let items = self.gateway.list_events_on(date).await?;
        let Some(needle) = title.map(str::to_lowercase) else {
            return Ok(None);
        };
        Ok(items.into_iter().find(|ev| {
            ev.summary.as_deref().is_some_and(|s| s.to_lowercase().contains(&needle))
        }))
    }

    async fn plan_day(&mut self, date: NaiveDate) {
        let prompt = format!(
            "Create a calm, balanced schedule for {} on {}. Return ONLY a JSON array like: \
             [ {{ \"title\":\"...\", \"start\":\"HH:MM\", \"end\":\"HH:MM\", \"notes\":\"\" }} ]",
            self.display_name, date
        );
        let raw = match self.model.generate_content(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Plan generation failed: {}", e);
                self.push_bot("I couldn't plan right now.");
                return;
            }
        };

        let slots = parse_plan_schedule(&raw);
        if slots.is_empty() {
            self.push_bot(format!("I have a plan idea:\n{}", clean_reply(&raw)));
            return;
        }

        // One request at a time, deliberately, to stay under API quotas.
        let mut created_count = 0;
        for slot in &slots {
            let input = EventInput {
                title: slot.title.clone(),
                date,
                start_time: slot.start.clone(),
                end_time: Some(slot.end.clone()),
                notes: slot.notes.clone(),
            };
            match self.gateway.create_event(&input).await {
                Ok(_) => created_count += 1,
                Err(e) => debug!("Plan slot create failed for '{}': {}", slot.title, e),
            }
        }
        self.push_bot(format!("Created {} events for the day.", created_count));
    }

    /// Free-form reply in the assistant's voice for messages with no
    /// scheduling intent.
    async fn reply_in_persona(&mut self, user_text: &str, today: NaiveDate) {
        self.begin_thinking("Let me gently respond…");
        let prompt = format!(
            "You are {name}, a calm, gentle personal assistant.\n\n\
             Rules:\n\
             - When the user asks about today's date or time, ALWAYS answer with the real value.\n\
             - NEVER use placeholders.\n\
             - Use the date: {today}.\n\
             - Keep the tone gentle, motivating, peaceful.\n\n\
             User message: \"{text}\"",
            name = self.assistant_name,
            today = today,
            text = user_text,
        );
        match self.model.generate_content(&prompt).await {
            Ok(raw) => self.finish_thinking(clean_reply(&raw)),
            Err(e) => {
                debug!("Persona reply failed: {}", e);
                self.finish_thinking("I couldn't think clearly now. Try again.");
            }
        }
    }
}
