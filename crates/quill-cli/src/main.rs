//! Quill CLI - live collaborative note editing from the terminal
//!
//! Opens a note with other editors, shows who is present, and saves after a
//! pause in typing. Also exposes the AI study helpers.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::ai::{run_analyze, run_ask, run_quiz};
use crate::commands::common::load_config;
use crate::commands::demo::run_demo;
use crate::commands::edit::run_edit;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quill=warn".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.debounce_ms, cli.flush_on_close)?;

    match cli.command {
        Commands::Edit { note_id, json } => run_edit(&note_id, &config, json).await?,
        Commands::Demo { json } => run_demo(&config, json).await?,
        Commands::Analyze { note_id, json } => run_analyze(&note_id, &config, json).await?,
        Commands::Quiz {
            note_id,
            count,
            json,
        } => run_quiz(&note_id, count, &config, json).await?,
        Commands::Ask { note_id, question } => run_ask(&note_id, &question, &config).await?,
    }

    Ok(())
}
