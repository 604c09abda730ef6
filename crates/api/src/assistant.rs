use std::env;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_ASSISTANT_MODEL: &str = "gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = "You are a helpful customer service representative for Motion Design Club, an online platform for motion design courses. \
Be friendly, professional, and knowledgeable about our courses and services.
Key information about our platform:
- We offer motion design courses ranging from $49 to $199
- Courses duration: 4-12 weeks
- We provide certificates upon completion
- 30-day money-back guarantee
- 24/7 support available
- Basic computer skills required for most courses
- Advanced courses may require prior design software experience";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    /// Chat completions URL, overridable with `CLUB_OPENAI_ENDPOINT`.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AssistantConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            model: DEFAULT_ASSISTANT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 150,
        }
    }

    pub fn from_env() -> Option<Self> {
        let api_key = env::var("CLUB_OPENAI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(model) = env::var("CLUB_OPENAI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(endpoint) = env::var("CLUB_OPENAI_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.endpoint = endpoint.trim().to_string();
            }
        }
        Some(config)
    }
}

pub fn build_payload(config: &AssistantConfig, text: &str) -> Value {
    json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": text }
        ],
        "temperature": config.temperature,
        "max_tokens": config.max_tokens
    })
}

/// Pulls `choices[0].message.content` out of a chat completions body.
pub fn extract_reply(payload: &Value) -> Option<String> {
    payload
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn complete(client: &Client, config: &AssistantConfig, text: &str) -> Result<String> {
    let response = client
        .post(config.endpoint.as_str())
        .bearer_auth(config.api_key.as_str())
        .json(&build_payload(config, text))
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI non-success status {}: {}", status.as_u16(), body);
    }

    let body: Value = response.json().await.context("OpenAI parse failed")?;
    extract_reply(&body).context("OpenAI reply content missing")
}
