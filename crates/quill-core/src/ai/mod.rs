//! AI study helpers: note analysis, quiz generation, and tutoring answers.
//!
//! These sit beside the editor core and never touch a session.

mod gemini;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};

/// Answer options every quiz question must carry.
pub const QUIZ_OPTION_COUNT: usize = 4;
pub const DEFAULT_QUIZ_QUESTIONS: usize = 5;
pub const MAX_QUIZ_QUESTIONS: usize = 20;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI service returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("AI response was not usable: {0}")]
    Malformed(String),
    #[error("Invalid AI request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteAnalysis {
    pub summary: String,
    #[serde(alias = "keyPoints", default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    /// Minutes
    #[serde(alias = "estimatedReadTime", deserialize_with = "whole_minutes")]
    pub estimated_read_time: u32,
    #[serde(alias = "studyTips", default)]
    pub study_tips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(alias = "correctAnswer")]
    pub correct_answer: usize,
    #[serde(default)]
    pub explanation: String,
    #[serde(rename = "type", default = "multiple_choice")]
    pub kind: String,
}

fn multiple_choice() -> String {
    "multiple-choice".to_string()
}

impl QuizQuestion {
    /// Reject questions the UI cannot render.
    pub fn validate(&self) -> Result<(), AiError> {
        if self.question.trim().is_empty() {
            return Err(AiError::Malformed("quiz question text is empty".into()));
        }
        if self.options.len() != QUIZ_OPTION_COUNT {
            return Err(AiError::Malformed(format!(
                "quiz question has {} options, expected {QUIZ_OPTION_COUNT}",
                self.options.len()
            )));
        }
        if self.correct_answer >= self.options.len() {
            return Err(AiError::Malformed(format!(
                "correct answer index {} is out of range",
                self.correct_answer
            )));
        }
        Ok(())
    }
}

/// Generative study helper.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, content: &str, title: &str) -> Result<NoteAnalysis, AiError>;

    async fn generate_quiz(
        &self,
        content: &str,
        title: &str,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, AiError>;

    async fn ask_question(&self, content: &str, question: &str) -> Result<String, AiError>;
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z]*\n?").expect("Invalid regex"))
}

/// Remove Markdown code fences models like to wrap JSON in.
pub fn strip_code_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

pub fn parse_analysis(text: &str) -> Result<NoteAnalysis, AiError> {
    serde_json::from_str(&strip_code_fences(text))
        .map_err(|error| AiError::Malformed(format!("analysis JSON: {error}")))
}

/// Decode and validate a quiz, keeping at most `count` questions.
pub fn parse_quiz(text: &str, count: usize) -> Result<Vec<QuizQuestion>, AiError> {
    let mut questions: Vec<QuizQuestion> = serde_json::from_str(&strip_code_fences(text))
        .map_err(|error| AiError::Malformed(format!("quiz JSON: {error}")))?;
    if questions.is_empty() {
        return Err(AiError::Malformed("quiz contained no questions".into()));
    }
    questions.truncate(count);
    for question in &questions {
        question.validate()?;
    }
    Ok(questions)
}

fn whole_minutes<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let minutes = f64::deserialize(deserializer)?;
    if !minutes.is_finite() || minutes < 0.0 {
        return Err(serde::de::Error::custom("read time must be a positive number"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(minutes.ceil().min(f64::from(u32::MAX)) as u32)
}

pub fn analysis_prompt(content: &str, title: &str) -> String {
    format!(
        "Analyze this study note and provide insights in JSON format:\n\n\
         Title: {title}\n\
         Content: {content}\n\n\
         Return JSON with:\n\
         - summary: 2-3 sentence summary\n\
         - keyPoints: Array of 3-5 important points\n\
         - tags: Array of 3-5 relevant study tags\n\
         - difficulty: \"beginner\", \"intermediate\", or \"advanced\"\n\
         - estimatedReadTime: Reading time in minutes (number)\n\
         - studyTips: Array of 3 specific study recommendations\n\n\
         Keep responses student-friendly and concise."
    )
}

pub fn quiz_prompt(content: &str, title: &str, count: usize) -> String {
    format!(
        "Create {count} multiple-choice quiz questions from this study material:\n\n\
         Title: {title}\n\
         Content: {content}\n\n\
         Return JSON array with each question having:\n\
         - question: Clear question text\n\
         - options: Array of 4 possible answers\n\
         - correctAnswer: Index (0-3) of correct answer\n\
         - explanation: Why the answer is correct\n\
         - type: \"multiple-choice\"\n\n\
         Make questions test understanding, not just memory."
    )
}

pub fn tutor_prompt(content: &str, question: &str) -> String {
    format!(
        "You are an AI study tutor helping a student understand their notes.\n\n\
         Student's Notes: {content}\n\n\
         Student's Question: {question}\n\n\
         Provide a clear, helpful answer based on the notes. If the question isn't \
         covered in the notes, say so politely and offer related information that might help.\n\n\
         Keep your response educational and encouraging."
    )
}
