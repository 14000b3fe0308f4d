use quill_core::ai::{AnalysisService, GeminiClient, NoteAnalysis, QuizQuestion, MAX_QUIZ_QUESTIONS};
use quill_core::config::ClientConfig;
use quill_core::store::{NoteStore, SupabaseNoteStore};
use quill_core::Note;

use crate::commands::common::{normalize_content, normalize_note_identifier};
use crate::error::CliError;

const OPTION_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

pub fn validate_question_count(count: usize) -> Result<usize, CliError> {
    if (1..=MAX_QUIZ_QUESTIONS).contains(&count) {
        Ok(count)
    } else {
        Err(CliError::InvalidQuestionCount(MAX_QUIZ_QUESTIONS))
    }
}

/// Join the trailing words of `quill ask` into one question.
pub fn join_question(parts: &[String]) -> Result<String, CliError> {
    normalize_content(&parts.join(" ")).ok_or(CliError::EmptyQuestion)
}

pub fn format_analysis(analysis: &NoteAnalysis) -> Vec<String> {
    let mut lines = vec![
        analysis.summary.clone(),
        String::new(),
        format!(
            "Difficulty: {:?} | Read time: {} min",
            analysis.difficulty, analysis.estimated_read_time
        ),
    ];
    if !analysis.tags.is_empty() {
        lines.push(format!("Tags: {}", analysis.tags.join(", ")));
    }
    if !analysis.key_points.is_empty() {
        lines.push(String::new());
        lines.push("Key points:".to_string());
        lines.extend(analysis.key_points.iter().map(|point| format!("  - {point}")));
    }
    if !analysis.study_tips.is_empty() {
        lines.push(String::new());
        lines.push("Study tips:".to_string());
        lines.extend(analysis.study_tips.iter().map(|tip| format!("  - {tip}")));
    }
    lines
}

pub fn format_quiz(questions: &[QuizQuestion]) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format!("{}. {}", index + 1, question.question));
        for (label, option) in OPTION_LABELS.iter().zip(&question.options) {
            lines.push(format!("   {label}) {option}"));
        }
        let answer = OPTION_LABELS
            .get(question.correct_answer)
            .copied()
            .unwrap_or('?');
        if question.explanation.is_empty() {
            lines.push(format!("   Answer: {answer}"));
        } else {
            lines.push(format!("   Answer: {answer} ({})", question.explanation));
        }
    }
    lines
}

async fn fetch_study_note(note_id: &str, config: &ClientConfig) -> Result<Note, CliError> {
    let note_id = normalize_note_identifier(note_id)?;
    let store = SupabaseNoteStore::new(config.store_config()?)?;
    let note = store.get(&note_id).await?;
    if normalize_content(note.content_or_empty()).is_none() {
        return Err(CliError::EmptyNote);
    }
    Ok(note)
}

fn gemini(config: &ClientConfig) -> Result<GeminiClient, CliError> {
    let client = GeminiClient::new(config.gemini_config()?)?;
    tracing::debug!(model = client.model(), "Using Gemini");
    Ok(client)
}

pub async fn run_analyze(note_id: &str, config: &ClientConfig, json: bool) -> Result<(), CliError> {
    let client = gemini(config)?;
    let note = fetch_study_note(note_id, config).await?;
    let analysis = client.analyze(note.content_or_empty(), &note.title).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        for line in format_analysis(&analysis) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_quiz(
    note_id: &str,
    count: usize,
    config: &ClientConfig,
    json: bool,
) -> Result<(), CliError> {
    let count = validate_question_count(count)?;
    let client = gemini(config)?;
    let note = fetch_study_note(note_id, config).await?;
    let questions = client
        .generate_quiz(note.content_or_empty(), &note.title, count)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
    } else {
        for line in format_quiz(&questions) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_ask(note_id: &str, question: &[String], config: &ClientConfig) -> Result<(), CliError> {
    let question = join_question(question)?;
    let client = gemini(config)?;
    let note = fetch_study_note(note_id, config).await?;
    let answer = client.ask_question(note.content_or_empty(), &question).await?;
    println!("{}", answer.trim());
    Ok(())
}
