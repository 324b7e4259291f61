//! Interactive application
//!
//! Wires the configured dependencies together and runs the chat loop.
//! Plain lines go to the conversation controller; lines starting with `/`
//! drive the dashboard, the daily task and token management.

use crate::ai::{GeminiClient, TextModel};
use crate::api_server::{start_api_server, ApiState};
use crate::auth::TokenStore;
use crate::calendar::{CalendarGateway, GatewayError};
use crate::chat::ConversationController;
use crate::config::Config;
use crate::dashboard::{DashboardController, EditField, DEFAULT_UPCOMING_DAYS};
use crate::tasks::{FileStore, TaskStore};
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use log::{error, info, warn};
use rustyline::DefaultEditor;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Application;

impl Application {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let config = Config::load()?;
        let mut session = Session::build(config)?;

        // Serve the web chat UI alongside the terminal.
        let api_handle = session.spawn_api_server();

        let mut rl = DefaultEditor::new()?;
        println!("Welcome to {}! How can I assist you today?", session.assistant_name);
        println!("Example: add gym tomorrow 6pm  (type /help for commands)");

        let email = session.config.assistant.user_email.clone().unwrap_or_default();
        session
            .tasks
            .ensure_profile(&session.user_id, &session.config.display_name(), &email)
            .await?;

        for reply in session.chat.lock().await.greet().await {
            print_reply(&reply);
        }

        let prompt = "🌿 ";
        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match session.process_input(&line).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(err) => error!("Failed to process input: {:?}", err),
                    }
                }
                Err(rustyline::error::ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(rustyline::error::ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(handle) = api_handle {
            handle.abort();
        }

        Ok(())
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

struct Session {
    config: Config,
    assistant_name: String,
    timezone: Tz,
    tokens: Arc<TokenStore>,
    gateway: Arc<CalendarGateway>,
    tasks: Arc<TaskStore>,
    chat: Arc<Mutex<ConversationController>>,
    dashboard: DashboardController,
    user_id: String,
}

impl Session {
    fn build(config: Config) -> Result<Self> {
        let timezone: Tz = config.timezone().parse().unwrap_or_else(|_| {
            warn!("Unknown timezone '{}', falling back to Asia/Kolkata", config.timezone());
            chrono_tz::Asia::Kolkata
        });

        let model: Arc<dyn TextModel> = Arc::new(GeminiClient::new(
            &config.model_name(),
            config.model.api_base.as_deref(),
        )?);

        let tokens = Arc::new(TokenStore::new()?);
        let gateway = Arc::new(CalendarGateway::new(
            None,
            &config.calendar_id(),
            &config.timezone(),
            &config.utc_offset(),
            tokens.clone(),
        ));

        let data_dir = match &config.store.data_dir {
            Some(dir) => dir.clone(),
            None => FileStore::default_dir()?,
        };
        let store = Arc::new(FileStore::new(data_dir)?);
        let tasks = Arc::new(TaskStore::new(store, model.clone()));

        let chat = Arc::new(Mutex::new(ConversationController::new(
            &config,
            model,
            gateway.clone(),
            tasks.clone(),
            tokens.clone(),
        )));
        let dashboard = DashboardController::new(gateway.clone(), timezone);

        let user_id =
            config.assistant.user_email.clone().unwrap_or_else(|| "local-user".to_string());

        Ok(Self {
            assistant_name: config.assistant_name(),
            timezone,
            tokens,
            gateway,
            tasks,
            chat,
            dashboard,
            user_id,
            config,
        })
    }

    fn spawn_api_server(&self) -> Option<tokio::task::JoinHandle<()>> {
        let listen = self.config.api.listen.clone()?;
        let state = Arc::new(ApiState { chat: self.chat.clone(), gateway: self.gateway.clone() });
        info!("Starting API server on {}", listen);
        Some(tokio::spawn(async move {
            if let Err(e) = start_api_server(state, &listen).await {
                error!("API server error: {:?}", e);
            }
        }))
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Returns true when the session should end.
    async fn process_input(&mut self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }
        if let Some(command) = line.strip_prefix('/') {
            return self.process_command(command).await;
        }

        for reply in self.chat.lock().await.handle_message(line).await {
            print_reply(&reply);
        }
        Ok(false)
    }

    async fn process_command(&mut self, command: &str) -> Result<bool> {
        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_lowercase();
        let rest = parts.next().unwrap_or("").trim();

        match name.as_str() {
            "help" => print_help(),
            "exit" | "quit" => return Ok(true),
            "login" => {
                if rest.is_empty() {
                    println!("Usage: /login <access-token>");
                } else {
                    self.tokens.set(SecretString::from(rest.to_string()))?;
                    for reply in self.chat.lock().await.after_login().await {
                        print_reply(&reply);
                    }
                }
            }
            "logout" => {
                self.tokens.clear()?;
                println!("Signed out of the calendar.");
            }
            "task" => {
                let task = self
                    .tasks
                    .get_or_create_today_task(&self.user_id, &self.config.display_name(), self.today())
                    .await?;
                let streak = self.tasks.current_streak(&self.user_id).await?;
                print_reply(&format!(
                    "🌿 Today's Gentle Task\n{}\nStreak: {} days",
                    task.task, streak.current_streak
                ));
            }
            "done" => match rest.to_lowercase().as_str() {
                "yes" | "y" => {
                    let streak =
                        self.tasks.mark_completion(&self.user_id, self.today(), true).await?;
                    print_reply(&format!(
                        "🔥 Wonderful! You completed today's challenge. Streak: {} days",
                        streak.current_streak
                    ));
                }
                "no" | "n" => {
                    self.tasks.mark_completion(&self.user_id, self.today(), false).await?;
                    print_reply("It's okay ❤️ Tomorrow we'll come back stronger!");
                }
                _ => println!("Usage: /done yes|no"),
            },
            "calendars" => match self.gateway.list_calendars().await {
                Ok(calendars) => {
                    println!("I can see {} calendars.", calendars.len());
                    for calendar in calendars {
                        println!("  {} ({})", calendar.summary.unwrap_or_default(), calendar.id);
                    }
                }
                Err(GatewayError::MissingToken) => {
                    println!("Please /login first so I can read your calendars.")
                }
                Err(e) => println!("I couldn't read your calendars: {}", e),
            },
            "extract" => {
                if rest.is_empty() {
                    println!("Usage: /extract <one item>; <another item>; ...");
                } else {
                    let raw = rest.replace(';', "\n");
                    let count = self.dashboard.extract_all(&raw);
                    println!("Extracted {} events:", count);
                    self.print_extracted();
                }
            }
            "add" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                let usage = || anyhow!("Usage: /add <YYYY-MM-DD> <HH:MM> <title>");
                let date = parts
                    .next()
                    .and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok())
                    .ok_or_else(usage)?;
                let time = parts.next().ok_or_else(usage)?;
                let title = parts.next().ok_or_else(usage)?.trim();
                if title.is_empty() {
                    return Err(usage());
                }
                match self.dashboard.create_manual(title, date, time).await {
                    Ok(message) => println!("{}", message),
                    Err(e) => println!("{}", e),
                }
            }
            "list" => self.print_extracted(),
            "edit" => self.edit_extracted(rest)?,
            "remove" => {
                let index: usize = rest.parse().map_err(|_| anyhow!("Usage: /remove <n>"))?;
                self.dashboard.remove_extracted(index)?;
                self.print_extracted();
            }
            "approve" => {
                if rest.eq_ignore_ascii_case("all") {
                    let (created, attempted) = self.dashboard.approve_all().await;
                    println!("Created {}/{} events.", created, attempted);
                } else {
                    let index: usize =
                        rest.parse().map_err(|_| anyhow!("Usage: /approve <n>|all"))?;
                    match self.dashboard.approve(index).await {
                        Ok(message) => println!("{}", message),
                        Err(e) => println!("{}", e),
                    }
                }
            }
            "upcoming" => {
                let days: u64 = if rest.is_empty() {
                    DEFAULT_UPCOMING_DAYS
                } else {
                    rest.parse().map_err(|_| anyhow!("Usage: /upcoming [days]"))?
                };
                match self.dashboard.refresh_upcoming(days).await {
                    Ok(count) => {
                        println!("{} upcoming events in the next {} days:", count, days);
                        for (i, event) in self.dashboard.upcoming().iter().enumerate() {
                            println!("  [{}] {} — {}", i, event.start_display(), event.title());
                        }
                    }
                    Err(GatewayError::MissingToken) => {
                        println!("Please /login first so I can read your events.")
                    }
                    Err(e) => println!("I couldn't load upcoming events: {}", e),
                }
            }
            "delete" => {
                let index: usize = rest.parse().map_err(|_| anyhow!("Usage: /delete <n>"))?;
                match self.dashboard.delete_upcoming(index).await {
                    Ok(message) => println!("{}", message),
                    Err(e) => println!("{}", e),
                }
            }
            "update" => self.update_upcoming(rest).await?,
            "activity" => {
                for entry in self.dashboard.activity().iter().take(10) {
                    println!("- {}", entry);
                }
                if self.dashboard.activity().is_empty() {
                    println!("No actions yet.");
                }
            }
            _ => println!("Unknown command. Type /help for available commands."),
        }
        Ok(false)
    }

    fn print_extracted(&self) {
        if self.dashboard.extracted().is_empty() {
            println!("No extracted items.");
            return;
        }
        for (i, event) in self.dashboard.extracted().iter().enumerate() {
            let status = match event.status {
                crate::extractor::EventStatus::Pending => "pending",
                crate::extractor::EventStatus::Created => "created",
            };
            println!(
                "  [{}] {} — {} {} ({})",
                i, event.title, event.date, event.start_time, status
            );
        }
    }

    fn edit_extracted(&mut self, rest: &str) -> Result<()> {
        let mut parts = rest.splitn(3, char::is_whitespace);
        let usage = || anyhow!("Usage: /edit <n> title|date|time <value>");
        let index: usize = parts.next().and_then(|p| p.parse().ok()).ok_or_else(usage)?;
        let field = match parts.next().map(str::to_lowercase).as_deref() {
            Some("title") => EditField::Title,
            Some("date") => EditField::Date,
            Some("time") => EditField::Time,
            _ => return Err(usage()),
        };
        let value = parts.next().ok_or_else(usage)?;
        self.dashboard.edit_extracted(index, field, value)?;
        self.print_extracted();
        Ok(())
    }

    async fn update_upcoming(&mut self, rest: &str) -> Result<()> {
        let mut parts = rest.splitn(3, char::is_whitespace);
        let usage = || anyhow!("Usage: /update <n> title|date|time <value>");
        let index: usize = parts.next().and_then(|p| p.parse().ok()).ok_or_else(usage)?;
        let field = parts.next().map(str::to_lowercase).ok_or_else(usage)?;
        let value = parts.next().ok_or_else(usage)?.trim();

        let result = match field.as_str() {
            "title" => {
                self.dashboard.update_upcoming(index, Some(value.to_string()), None, None).await
            }
            "date" => {
                let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|_| anyhow!("Expected date as YYYY-MM-DD, got '{}'", value))?;
                // The API needs a start time with a date change; reuse the
                // event's current clock when it has one.
                let start_time = self
                    .dashboard
                    .upcoming()
                    .get(index)
                    .map(current_clock)
                    .unwrap_or_else(|| "09:00".to_string());
                self.dashboard.update_upcoming(index, None, Some(date), Some(start_time)).await
            }
            "time" => {
                let date = self
                    .dashboard
                    .upcoming()
                    .get(index)
                    .and_then(current_date)
                    .unwrap_or_else(|| self.today());
                self.dashboard
                    .update_upcoming(index, None, Some(date), Some(value.to_string()))
                    .await
            }
            _ => return Err(usage()),
        };

        match result {
            Ok(message) => println!("{}", message),
            Err(e) => println!("{}", e),
        }
        Ok(())
    }
}

fn current_clock(event: &crate::calendar::CalendarEvent) -> String {
    let start = event.start_display();
    match start.split_once('T') {
        Some((_, time)) if time.len() >= 5 => time[..5].to_string(),
        _ => "09:00".to_string(),
    }
}

fn current_date(event: &crate::calendar::CalendarEvent) -> Option<NaiveDate> {
    let start = event.start_display();
    let date_part = start.split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn print_reply(reply: &str) {
    println!();
    println!("{}", reply);
    println!();
}

fn print_help() {
    println!("Chat: just type, e.g. 'add gym tomorrow 6pm' or 'what's on today'");
    println!("Batch: 'Gym, 20/6/2025, 06:00' lines create events directly");
    println!("Commands:");
    println!("  /login <token>          Store a Google Calendar access token");
    println!("  /logout                 Forget the stored token");
    println!("  /task                   Show today's gentle task and streak");
    println!("  /done yes|no            Mark today's task complete or not");
    println!("  /extract <a>; <b>; ...  Extract events from pasted items");
    println!("  /list                   Show extracted items");
    println!("  /edit <n> <field> <v>   Edit an extracted item (title|date|time)");
    println!("  /remove <n>             Remove an extracted item");
    println!("  /approve <n>|all        Create extracted events in the calendar");
    println!("  /add <date> <time> <t>  Create one event directly");
    println!("  /upcoming [days]        List upcoming events (default 30 days)");
    println!("  /update <n> <field> <v> Update an upcoming event");
    println!("  /delete <n>             Delete an upcoming event");
    println!("  /calendars              List available calendars");
    println!("  /activity               Recent dashboard activity");
    println!("  /help                   Show this help");
    println!("  /exit                   Leave");
}
