//! Terminal front end: interactive chat, one-shot prompts and execute mode

use crate::aggregator::Delta;
use crate::engine::{CompletedTurn, Engine, EngineError, TurnOutcome};
use crate::execute::{shell_command, ExecuteOutcome, Launcher};
use crate::input::{Command, InputBuffer, InputStep};
use crate::state_machine::{UsageRecord, UsageTotals};
use crossterm::queue;
use crossterm::style::{Attribute, Print, SetAttribute};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::process::ExitCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Exit code for a turn interrupted with Ctrl-C
const INTERRUPTED: u8 = 130;

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("Line editor failed: {0}")]
    Readline(#[from] ReadlineError),
}

/// Writes streamed fragments, thinking dimmed
pub struct Renderer<W: Write> {
    out: W,
    in_thinking: bool,
    wrote: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            in_thinking: false,
            wrote: false,
        }
    }

    pub fn delta(&mut self, delta: Delta<'_>) {
        if let Err(e) = self.write_delta(delta) {
            tracing::warn!(error = %e, "Failed to write output");
        }
    }

    fn write_delta(&mut self, delta: Delta<'_>) -> io::Result<()> {
        match delta {
            Delta::Thinking(text) => {
                if !self.in_thinking {
                    queue!(self.out, SetAttribute(Attribute::Dim))?;
                    self.in_thinking = true;
                }
                queue!(self.out, Print(text))?;
            }
            Delta::Text(text) => {
                if self.in_thinking {
                    queue!(self.out, SetAttribute(Attribute::Reset), Print("\n\n"))?;
                    self.in_thinking = false;
                }
                queue!(self.out, Print(text))?;
            }
        }
        self.wrote = true;
        self.out.flush()
    }

    /// End the current answer, restoring normal style
    pub fn finish(&mut self) {
        if let Err(e) = self.write_end() {
            tracing::warn!(error = %e, "Failed to write output");
        }
    }

    fn write_end(&mut self) -> io::Result<()> {
        if self.in_thinking {
            queue!(self.out, SetAttribute(Attribute::Reset))?;
            self.in_thinking = false;
        }
        if self.wrote {
            queue!(self.out, Print("\n"))?;
            self.wrote = false;
        }
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// `Tokens: in/out | Price: $x | Total: $y`
pub fn price_line(turn: &UsageRecord, totals: &UsageTotals) -> String {
    let mut line = format!(
        "Tokens: {}/{} | Price: ${:.3} | Total: ${:.3}",
        turn.input_tokens, turn.output_tokens, turn.cost.amount, totals.cost
    );
    if turn.cost.unknown_pricing() {
        line.push_str(" (no pricing known for this model)");
    }
    line
}

enum Request<'a> {
    Submit(&'a str),
    Regenerate,
}

/// Run one request, cancelling it on Ctrl-C
async fn stream_turn<W: Write>(
    engine: &mut Engine,
    request: Request<'_>,
    renderer: &mut Renderer<W>,
) -> Result<TurnOutcome, EngineError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = match request {
        Request::Submit(text) => engine.run_turn(text, &cancel, |d| renderer.delta(d)).await,
        Request::Regenerate => engine.regenerate(&cancel, |d| renderer.delta(d)).await,
    };
    watcher.abort();
    renderer.finish();
    outcome
}

fn report_failure(error: &crate::llm::LlmError) {
    eprintln!("Error ({}): {error}", error.kind);
    if let Some(wait) = error.retry_after {
        eprintln!("Retry after {}s", wait.as_secs());
    }
}

fn report_price(show_price: bool, turn: &CompletedTurn, totals: &UsageTotals) {
    if show_price {
        eprintln!("{}", price_line(&turn.usage, totals));
    }
}

fn banner(engine: &Engine) -> String {
    let spec = engine.spec();
    format!(
        "Hi! I'm {} ({} {}). Type :q or Ctrl-D to quit, :c or Ctrl-C to clear, :r to regenerate, \
         \"\"\" on its own line for multi-line input.",
        engine.assistant(),
        spec.provider.display_name(),
        spec.model
    )
}

/// Interactive chat loop
pub async fn run(engine: &mut Engine, show_price: bool) -> Result<(), ReplError> {
    let mut editor = DefaultEditor::new()?;
    let mut buffer = InputBuffer::new();
    let mut renderer = Renderer::new(io::stdout());
    println!("{}", banner(engine));

    loop {
        let prompt = if buffer.in_multiline() { "... " } else { "> " };
        let line = match tokio::task::block_in_place(|| editor.readline(prompt)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.reset();
                engine.clear();
                println!("Cleared the conversation.");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let command = match buffer.feed(&line) {
            InputStep::Continue | InputStep::Ignore => continue,
            InputStep::Command(command) => command,
        };
        let request = match &command {
            Command::Quit => break,
            Command::Clear => {
                engine.clear();
                println!("Cleared the conversation.");
                continue;
            }
            Command::Regenerate => Request::Regenerate,
            Command::Submit(text) => {
                editor.add_history_entry(text.as_str())?;
                Request::Submit(text)
            }
        };

        match stream_turn(engine, request, &mut renderer).await {
            Ok(TurnOutcome::Completed(turn)) => report_price(show_price, &turn, &engine.totals()),
            Ok(TurnOutcome::Failed(error)) => {
                report_failure(&error);
                // Shown to the user, so the error state can be left
                if let Err(e) = engine.acknowledge() {
                    tracing::warn!(error = %e, "Acknowledge rejected");
                }
            }
            Ok(TurnOutcome::Cancelled) => println!("Cancelled."),
            Err(e) => eprintln!("{e}"),
        }
    }
    Ok(())
}

/// Single non-interactive turn; the answer goes to stdout
pub async fn run_once(engine: &mut Engine, prompt: &str, show_price: bool) -> ExitCode {
    let mut renderer = Renderer::new(io::stdout());
    match stream_turn(engine, Request::Submit(prompt), &mut renderer).await {
        Ok(TurnOutcome::Completed(turn)) => {
            report_price(show_price, &turn, &engine.totals());
            ExitCode::SUCCESS
        }
        Ok(TurnOutcome::Failed(error)) => {
            report_failure(&error);
            ExitCode::FAILURE
        }
        Ok(TurnOutcome::Cancelled) => ExitCode::from(INTERRUPTED),
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Ask for a shell command, let the user review it, then run it
pub async fn execute_once(engine: &mut Engine, prompt: &str) -> ExitCode {
    let mut renderer = Renderer::new(io::stderr());
    let turn = match stream_turn(engine, Request::Submit(prompt), &mut renderer).await {
        Ok(TurnOutcome::Completed(turn)) => turn,
        Ok(TurnOutcome::Failed(error)) => {
            report_failure(&error);
            return ExitCode::FAILURE;
        }
        Ok(TurnOutcome::Cancelled) => return ExitCode::from(INTERRUPTED),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let command = shell_command(&turn.text);
    let launcher = Launcher::from_env();
    match tokio::task::block_in_place(|| launcher.edit_and_run(&command)) {
        Ok(ExecuteOutcome::Ran(status)) => status
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .map_or(ExitCode::FAILURE, ExitCode::from),
        Ok(ExecuteOutcome::Aborted) => {
            eprintln!("Empty command, nothing to run.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
