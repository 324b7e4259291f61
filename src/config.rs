use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssistantConfig {
    /// Display name the assistant uses for itself in replies.
    pub name: Option<String>,
    /// Email the greeting derives the user's display name from.
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CalendarConfig {
    pub default_calendar: Option<String>,
    /// IANA zone used to resolve "today"/"tomorrow".
    pub timezone: Option<String>,
    /// Fixed UTC offset stamped onto event timestamps, e.g. "+05:30".
    pub utc_offset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    pub model: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Overrides the default data directory for the document store.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    pub listen: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig { name: Some("FiG".to_string()), user_email: None },
            calendar: CalendarConfig {
                default_calendar: Some("primary".to_string()),
                timezone: Some("Asia/Kolkata".to_string()),
                utc_offset: Some("+05:30".to_string()),
            },
            model: ModelConfig { model: Some("gemini-2.0-flash".to_string()), api_base: None },
            store: StoreConfig { data_dir: None },
            api: ApiConfig { listen: Some("127.0.0.1:3000".to_string()) },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        // If config doesn't exist, create default
        if !config_path.exists() {
            let default_config = Config::default();
            default_config.save()?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn assistant_name(&self) -> String {
        self.assistant.name.clone().unwrap_or_else(|| "FiG".to_string())
    }

    /// Display name for greetings, derived from the configured email's
    /// local part ("subash@example.com" -> "Subash").
    pub fn display_name(&self) -> String {
        let local =
            self.assistant.user_email.as_deref().and_then(|e| e.split('@').next()).unwrap_or("");
        let mut chars = local.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => "friend".to_string(),
        }
    }

    pub fn calendar_id(&self) -> String {
        self.calendar.default_calendar.clone().unwrap_or_else(|| "primary".to_string())
    }

    pub fn timezone(&self) -> String {
        self.calendar.timezone.clone().unwrap_or_else(|| "Asia/Kolkata".to_string())
    }

    pub fn utc_offset(&self) -> String {
        self.calendar.utc_offset.clone().unwrap_or_else(|| "+05:30".to_string())
    }

    pub fn model_name(&self) -> String {
        self.model.model.clone().unwrap_or_else(|| "gemini-2.0-flash".to_string())
    }
}

fn get_config_path() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("com", "fig", "fig").context("Failed to determine config directory")?;

    Ok(proj_dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.calendar.default_calendar, Some("primary".to_string()));
        assert_eq!(config.calendar.timezone, Some("Asia/Kolkata".to_string()));
        assert_eq!(config.calendar.utc_offset, Some("+05:30".to_string()));
        assert_eq!(config.model.model, Some("gemini-2.0-flash".to_string()));
        assert_eq!(config.assistant_name(), "FiG");
    }

    #[test]
    fn test_display_name() {
        let mut config = Config::default();
        assert_eq!(config.display_name(), "friend");

        config.assistant.user_email = Some("subash@example.com".to_string());
        assert_eq!(config.display_name(), "Subash");
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let temp_dir = tempdir()?;
        env::set_var("XDG_CONFIG_HOME", temp_dir.path());

        let config = Config::default();
        config.save()?;

        let loaded = Config::load()?;
        assert_eq!(loaded.calendar.default_calendar, config.calendar.default_calendar);

        Ok(())
    }
}
