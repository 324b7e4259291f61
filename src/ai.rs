//! Text-generation model client
//!
//! Single operation: send a prompt, get text back. Every call is stateless,
//! so prompts must embed all the context they need. Controllers receive the
//! model through the [`TextModel`] trait so tests can substitute a fake.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::env;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<String>;
}

/// Client for the Gemini generateContent REST endpoint.
pub struct GeminiClient {
    client: Client,
    api_base: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(model: &str, api_base: Option<&str>) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| {
            anyhow!(
                "GEMINI_API_KEY environment variable not set. \
                 Please set your Gemini API key using: export GEMINI_API_KEY='your-key-here'"
            )
        })?;
        Ok(Self::with_api_key(model, api_base, api_key.into()))
    }

    pub fn with_api_key(model: &str, api_base: Option<&str>, api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    async fn generate_content(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        debug!("Sending prompt to model {} ({} chars)", self.model, prompt.len());

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&json!({
                "contents": [
                    {
                        "role": "user",
                        "parts": [{ "text": prompt }]
                    }
                ]
            }))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(anyhow!("Model API error: status {}, response: {}", status, response_text));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| anyhow!("Failed to parse model response: {}", e))?;

        let text = response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("Unexpected model response format: {}", response_text))?;

        Ok(text.trim().to_string())
    }
}

/// Strip control characters before user text reaches a prompt.
pub fn sanitize_user_input(input: &str) -> String {
    input.chars().filter(|&c| !c.is_control() || c == '\n' || c == '\t').collect()
}

/// Model replies render in a plain chat bubble; markdown emphasis is noise.
pub fn clean_reply(raw: &str) -> String {
    raw.replace('*', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_user_input() {
        let input = "Meeting with John\u{0000} tomorrow";
        assert_eq!(sanitize_user_input(input), "Meeting with John tomorrow");

        let input = "Lunch\nmeeting";
        assert_eq!(sanitize_user_input(input), "Lunch\nmeeting");
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(clean_reply("**Be gentle** with *yourself*"), "Be gentle with yourself");
    }

    #[test]
    fn test_client_base_url_trimmed() {
        let client = GeminiClient::with_api_key(
            "gemini-2.0-flash",
            Some("http://localhost:9000/v1beta/"),
            "test-key".to_string().into(),
        );
        assert_eq!(client.api_base, "http://localhost:9000/v1beta");
    }
}
