pub mod ai;
pub mod api_server;
pub mod app;
pub mod auth;
pub mod calendar;
pub mod chat;
pub mod config;
pub mod dashboard;
pub mod extractor;
pub mod intent;
pub mod tasks;

use anyhow::Result;
use log::*;

pub async fn run() -> Result<()> {
    let app = app::Application::new();
    info!("Initializing FiG application");
    app.run().await
}

// Re-export commonly used types
pub use config::Config;
pub use extractor::{ExtractedEvent, EventStatus};
pub use intent::SchedulingIntent;
