use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;

use super::{build_agent, resolve_collection};
use crate::cli::output::{QaRecord, get_formatter};
use crate::models::{Config, InputMessage, OutputFormat};
use crate::services::NullSink;
use crate::utils::file::{qa_output_path, write_json};

const USER_ID: &str = "cli_user";

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(help = "Questions to ask, each in its own conversation")]
    pub questions: Vec<String>,

    #[arg(long, short = 'q', help = "File with one question per line")]
    pub questions_file: Option<PathBuf>,

    #[arg(long, short = 'c', help = "Collection to answer from (defaults to retrieval.collection)")]
    pub collection: Option<String>,

    #[arg(long, help = "Do not save the answers under pipeline.output_dir")]
    pub no_save: bool,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let mut questions = args.questions;
    if let Some(path) = &args.questions_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read questions from {}", path.display()))?;
        questions.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    if questions.is_empty() {
        anyhow::bail!("no questions given: pass them as arguments or with --questions-file");
    }

    let collection = resolve_collection(args.collection, &config)?;
    let agent = build_agent(&config, &collection)?;
    let started = Local::now();
    let run_id = started.format("ask-%Y%m%d-%H%M%S").to_string();

    let mut answers = Vec::with_capacity(questions.len());
    for (i, question) in questions.into_iter().enumerate() {
        if verbose {
            eprintln!("[{}] {}", i, question);
        }

        let input = InputMessage::new(format!("{}-q{:02}", run_id, i), USER_ID, question.clone());
        let answer = match agent.handle(&input, &NullSink).await {
            Ok(output) => output.message,
            Err(e) => {
                tracing::warn!(question = i, error = %e, "question failed");
                format!("error: {}", e)
            }
        };
        answers.push(QaRecord {
            id: i,
            question,
            answer,
        });
    }

    print!("{}", formatter.format_answers(&answers));

    if !args.no_save {
        let path = qa_output_path(&config.pipeline.output_dir, &collection, started);
        write_json(&path, &answers)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Answers saved to {}", path.display());
    }

    Ok(())
}
