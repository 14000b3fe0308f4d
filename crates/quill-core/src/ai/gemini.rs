//! Google Gemini `generateContent` client.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    analysis_prompt, parse_analysis, parse_quiz, quiz_prompt, tutor_prompt, AiError,
    AnalysisService, NoteAnalysis, QuizQuestion, MAX_QUIZ_QUESTIONS,
};
use crate::util::error_excerpt;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, AiError> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::InvalidRequest("Gemini API key must not be empty".into()));
        }
        Ok(Self {
            config,
            client: Client::builder().build()?,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Send one prompt and return the concatenated text of the first candidate.
    pub async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| error_excerpt(&text));
            return Err(AiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let payload = response.json::<GenerateResponse>().await?;
        extract_text(payload)
    }
}

fn extract_text(payload: GenerateResponse) -> Result<String, AiError> {
    let text: String = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().map(|part| part.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AiError::Malformed("response had no text candidates".into()));
    }
    Ok(text)
}

#[async_trait]
impl AnalysisService for GeminiClient {
    async fn analyze(&self, content: &str, title: &str) -> Result<NoteAnalysis, AiError> {
        let text = self.generate(&analysis_prompt(content, title)).await?;
        parse_analysis(&text)
    }

    async fn generate_quiz(
        &self,
        content: &str,
        title: &str,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, AiError> {
        if count == 0 || count > MAX_QUIZ_QUESTIONS {
            return Err(AiError::InvalidRequest(format!(
                "question count must be between 1 and {MAX_QUIZ_QUESTIONS}"
            )));
        }
        let text = self.generate(&quiz_prompt(content, title, count)).await?;
        parse_quiz(&text, count)
    }

    async fn ask_question(&self, content: &str, question: &str) -> Result<String, AiError> {
        let answer = self.generate(&tutor_prompt(content, question)).await?;
        Ok(answer.trim().to_string())
    }
}
