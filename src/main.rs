//! gpt - terminal chat client for hosted and local language models
//!
//! Streams answers from OpenAI, Azure OpenAI, Anthropic, Google, Cohere and
//! OpenAI-compatible servers through one conversation engine.

mod aggregator;
mod assistant;
mod config;
mod engine;
mod execute;
mod input;
mod llm;
mod pricing;
mod repl;
mod state_machine;

use assistant::{Overrides, DEFAULT_ASSISTANT};
use clap::Parser;
use engine::Engine;
use llm::Provider;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "gpt", version, about = "Chat with language models from the terminal")]
struct Cli {
    /// Assistant to use (built-in: dev, general, bash)
    assistant: Option<String>,

    /// Provider to call, overriding inference from the model name
    #[arg(long)]
    provider: Option<Provider>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    top_p: Option<f32>,

    /// Token budget for extended thinking
    #[arg(long)]
    thinking_budget: Option<u32>,

    /// Config file (default: <config dir>/gpt-cli/gpt.yml)
    #[arg(long, env = "GPTCLI_CONFIG")]
    config: Option<PathBuf>,

    /// Send a prompt without entering interactive mode; repeat to add paragraphs
    #[arg(long, conflicts_with = "execute")]
    prompt: Vec<String>,

    /// Ask for a shell command, review it in $EDITOR, then run it
    #[arg(short = 'e', long)]
    execute: Option<String>,

    /// Hide the token and price line
    #[arg(long)]
    no_price: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level for this program when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(log_file: Option<&Path>, level: Option<&str>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gpt={}", level.unwrap_or(DEFAULT_LOG_LEVEL))));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_span_list(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        // stdout carries the answers
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match config::load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let log_file = cli.log_file.as_deref().or(settings.log_file.as_deref());
    let log_level = cli.log_level.as_deref().or(settings.log_level.as_deref());
    if let Err(e) = init_logging(log_file, log_level) {
        eprintln!("Failed to open log file: {e}");
        return ExitCode::FAILURE;
    }

    let assistant = match (&cli.assistant, &cli.execute) {
        (Some(name), _) => name.clone(),
        (None, Some(_)) => "bash".to_string(),
        (None, None) => settings
            .default_assistant
            .clone()
            .unwrap_or_else(|| DEFAULT_ASSISTANT.to_string()),
    };
    let overrides = Overrides {
        provider: cli.provider,
        model: cli.model.clone(),
        temperature: cli.temperature,
        top_p: cli.top_p,
        thinking_budget: cli.thinking_budget,
    };

    let mut engine = match Engine::from_settings(&settings, &assistant, &overrides) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let show_price = settings.show_price() && !cli.no_price;

    if let Some(task) = &cli.execute {
        return repl::execute_once(&mut engine, task).await;
    }
    if !cli.prompt.is_empty() {
        return repl::run_once(&mut engine, &cli.prompt.join("\n\n"), show_price).await;
    }

    match repl::run(&mut engine, show_price).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
