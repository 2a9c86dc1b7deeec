use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::prompts::{match_prompt, profile_hints_prompt, JSON_ONLY_SYSTEM};
use super::{
    parse_assessment, parse_profile_hints, AiAssessment, InferenceClient, InferenceError,
    MatchPrompt, ProfileHints,
};

const MAX_RETRIES: u32 = 3;
const MATCH_TEMPERATURE: f32 = 0.2;
const EXTRACTION_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

/// Client for a local Ollama instance (`POST {base_url}/api/generate`).
/// Retries 429 and 5xx responses with exponential backoff.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    retry_base: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry_base: Duration::from_millis(500),
        })
    }

    /// Overrides the first backoff delay; later delays double.
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Sends one prompt and returns the raw `response` text.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, InferenceError> {
        let request_body = GenerateRequest {
            model: &self.model,
            system: JSON_ONLY_SYSTEM,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions { temperature },
        };
        let url = format!("{}/api/generate", self.base_url);

        let mut last_error: Option<InferenceError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_base * (1 << (attempt - 1));
                warn!(
                    "Ollama call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).json(&request_body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(InferenceError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Ollama returned {}: {}", status, body);
                last_error = Some(InferenceError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<OllamaErrorBody>(&body)
                    .map(|e| e.error)
                    .unwrap_or(body);
                return Err(InferenceError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let generated: GenerateResponse = response.json().await?;
            debug!(
                model = %self.model,
                response_len = generated.response.len(),
                eval_count = ?generated.eval_count,
                "Ollama generation succeeded"
            );

            if generated.response.trim().is_empty() {
                return Err(InferenceError::EmptyContent);
            }
            return Ok(generated.response);
        }

        Err(last_error.unwrap_or(InferenceError::EmptyContent))
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn assess_match(&self, prompt: &MatchPrompt) -> Result<AiAssessment, InferenceError> {
        let text = self
            .generate(&match_prompt(prompt), MATCH_TEMPERATURE)
            .await?;
        parse_assessment(&text)
    }

    async fn profile_hints(&self, cv_text: &str) -> Result<ProfileHints, InferenceError> {
        let text = self
            .generate(&profile_hints_prompt(cv_text), EXTRACTION_TEMPERATURE)
            .await?;
        parse_profile_hints(&text)
    }

    fn backend(&self) -> &'static str {
        "ollama"
    }
}
