//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PlanGenerator;

#[derive(Debug, Clone, Error)]
pub enum GeminiError {
    #[error("AI service not configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, GeminiError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GeminiError::Blocked(reason));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GeminiError::InvalidResponse("no candidates returned".into()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return match candidate.finish_reason.as_deref() {
                Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => {
                    Err(GeminiError::Blocked(candidate.finish_reason.unwrap_or_default()))
                }
                _ => Err(GeminiError::InvalidResponse("empty completion".into())),
            };
        }
        Ok(text)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GeminiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeminiError::NotConfigured);
        }
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("sprintify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeminiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GeminiError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 4096,
                response_mime_type: "application/json",
            },
        };

        let res = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {
                let body = res
                    .json::<GenerateResponse>()
                    .await
                    .map_err(|e| GeminiError::InvalidResponse(e.to_string()))?;
                body.into_text()
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GeminiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(GeminiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(GeminiError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl PlanGenerator for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, GeminiError> {
        tracing::debug!(model = %self.model, "requesting plan from Gemini");
        self.generate(prompt).await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GeminiError {
    if e.is_timeout() {
        GeminiError::Timeout
    } else {
        GeminiError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_text().unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn reports_blocked_prompts() {
        let body: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(matches!(body.into_text(), Err(GeminiError::Blocked(_))));
    }

    #[test]
    fn empty_key_is_not_configured() {
        assert!(matches!(
            GeminiClient::new("", "m", "http://localhost"),
            Err(GeminiError::NotConfigured)
        ));
    }
}
