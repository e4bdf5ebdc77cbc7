use axum::http::StatusCode;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::AiConfig;
use crate::errors::ApiError;
use crate::{log_llm_operation, log_service_warn};

pub const ASSISTANT_INSTRUCTION: &str = "You are an inclusive educational assistant for students with disabilities. Explain clearly and simply. Keep answers to 2-4 sentences. Be warm and encouraging.";
pub const NOT_CONFIGURED_MESSAGE: &str = "AI service not configured.";
pub const UNAVAILABLE_MESSAGE: &str = "AI is not available right now. Please try again.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

/// Client for one configured Gemini model. There is no fallback model list;
/// a missing model is reported as such.
#[derive(Debug, Clone)]
pub struct AiService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl AiService {
    pub fn new(config: &AiConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn build_prompt(message: &str) -> String {
        format!("{}\n\nStudent asks: {}", ASSISTANT_INSTRUCTION, message.trim())
    }

    pub async fn chat(&self, message: &str) -> Result<String, ApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ApiError::AiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: NOT_CONFIGURED_MESSAGE.to_string(),
            });
        };

        let prompt = Self::build_prompt(message);
        log_llm_operation!(start, "chat", model = self.model, prompt_length = prompt.len());
        let started = Instant::now();

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.7,
                max_output_tokens: 512,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            log_llm_operation!(error, "chat", model = self.model, error = "model not found");
            return Err(ApiError::AiError {
                status: StatusCode::BAD_GATEWAY,
                message: format!(
                    "AI model '{}' was not found. Check GEMINI_MODEL.",
                    self.model
                ),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("upstream returned {}: {}", status, body)));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response body: {}", e)))?;

        let reply = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| self.unavailable("response had no text".to_string()))?;

        log_llm_operation!(
            success,
            "chat",
            model = self.model,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(reply)
    }

    fn unavailable(&self, detail: String) -> ApiError {
        log_service_warn!("ai_service", "chat", format!("model {}: {}", self.model, detail));
        ApiError::AiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_trimmed_question() {
        let prompt = AiService::build_prompt("  What is photosynthesis?  ");
        assert!(prompt.starts_with(ASSISTANT_INSTRUCTION));
        assert!(prompt.ends_with("\n\nStudent asks: What is photosynthesis?"));
    }

    #[tokio::test]
    async fn test_missing_key_reports_not_configured() {
        let service = AiService::new(&AiConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gemini-1.5-flash".to_string(),
        });

        match service.chat("hi").await {
            Err(ApiError::AiError { status, message }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, NOT_CONFIGURED_MESSAGE);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
