use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Edit study notes live with your classmates")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Quiet period after the last edit before saving, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Save unsaved edits once when the session closes
    #[arg(long, global = true)]
    pub flush_on_close: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a live editing session on a note
    Edit {
        /// Note ID
        note_id: String,
        /// Print each view update as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run two local editors against an in-memory note
    Demo {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize a note with key points and study tips
    Analyze {
        /// Note ID
        note_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a multiple-choice quiz from a note
    Quiz {
        /// Note ID
        note_id: String,
        /// Number of questions
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the study tutor a question about a note
    Ask {
        /// Note ID
        note_id: String,
        /// Question text
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
}
