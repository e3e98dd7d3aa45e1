//! Hosted generation model.
//!
//! [`ChatModel`] is the only thing the retrieval chain needs from an LLM:
//! a system prompt, prior turns, and the new user input in; text out.
//! [`GeminiModel`] implements it against the Gemini `generateContent` API.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::models::{ChatTurn, Role};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, system: &str, history: &[ChatTurn], input: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GeminiModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("GOOGLE_API_KEY is empty");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("ragdesk/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: GEMINI_API_URL.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, system: &str, history: &[ChatTurn], input: &str) -> GeminiRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    Role::Human => "user",
                    Role::Ai => "model",
                }
                .to_string(),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: input.to_string(),
            }],
        });

        GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
            system_instruction: (!system.is_empty()).then(|| SystemInstruction {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            }),
        }
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    async fn generate(&self, system: &str, history: &[ChatTurn], input: &str) -> Result<String> {
        let payload = self.build_request(system, history, input);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Gemini request failed: {}", e.without_url()))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!("Gemini error {}: {}", status, text);
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Invalid Gemini response: {}", e))?;
        extract_text(parsed)
    }
}

fn extract_text(response: GeminiResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        bail!("Empty response from Gemini");
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        bail!("Empty response from Gemini");
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> GeminiModel {
        GeminiModel::new(&LlmConfig::default(), "test-key").unwrap()
    }

    #[test]
    fn empty_key_rejected() {
        assert!(GeminiModel::new(&LlmConfig::default(), " ").is_err());
    }

    #[test]
    fn request_maps_history_roles() {
        let history = vec![ChatTurn::human("What is X?"), ChatTurn::ai("X is Y.")];
        let body = serde_json::to_value(model().build_request("sys", &history, "And Z?")).unwrap();

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "And Z?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
        assert!(body.get("generation_config").is_none());
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let body = serde_json::to_value(model().build_request("", &[], "hi")).unwrap();
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn response_text_parts_are_joined() {
        let parsed: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "Hello there");
    }

    #[test]
    fn no_candidates_is_error() {
        let parsed: GeminiResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(extract_text(parsed).is_err());
    }
}
