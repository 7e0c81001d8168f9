//! Execute mode: review a generated shell command in `$EDITOR`, then run it

use std::io::Write;
use std::process::{Command, ExitStatus};
use tempfile::NamedTempFile;
use thiserror::Error;

const DEFAULT_EDITOR: &str = "vi";
const DEFAULT_SHELL: &str = "sh";

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Failed to prepare command file: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Editor exited with {0}, command not run")]
    EditorFailed(ExitStatus),
}

#[derive(Debug)]
pub enum ExecuteOutcome {
    Ran(ExitStatus),
    /// The edited command was empty
    Aborted,
}

/// Reduce an answer to plain shell text
///
/// When the answer contains fenced code blocks only their bodies are kept.
pub fn shell_command(answer: &str) -> String {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in answer.lines() {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(body) => blocks.push(body.join("\n")),
                None => current = Some(Vec::new()),
            }
        } else if let Some(body) = current.as_mut() {
            body.push(line);
        }
    }
    // Unterminated fence
    if let Some(body) = current {
        blocks.push(body.join("\n"));
    }

    if blocks.is_empty() {
        answer.trim().to_string()
    } else {
        blocks.join("\n").trim().to_string()
    }
}

/// Editor and shell used to review and run a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    pub editor: String,
    pub shell: String,
}

impl Launcher {
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            editor: var("EDITOR", DEFAULT_EDITOR),
            shell: var("SHELL", DEFAULT_SHELL),
        }
    }

    /// Write `command` to a temp file, let the user edit it, then run it
    pub fn edit_and_run(&self, command: &str) -> Result<ExecuteOutcome, ExecuteError> {
        let mut file = tempfile::Builder::new()
            .prefix("gpt-execute-")
            .suffix(".sh")
            .tempfile()?;
        writeln!(file, "{command}")?;
        file.flush()?;

        self.run_editor(&file)?;

        let edited = std::fs::read_to_string(file.path())?;
        let edited = edited.trim();
        if edited.is_empty() {
            tracing::info!("Edited command is empty, not running");
            return Ok(ExecuteOutcome::Aborted);
        }

        tracing::debug!(shell = %self.shell, "Running edited command");
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(edited)
            .status()
            .map_err(|source| ExecuteError::Launch {
                program: self.shell.clone(),
                source,
            })?;
        Ok(ExecuteOutcome::Ran(status))
    }

    fn run_editor(&self, file: &NamedTempFile) -> Result<(), ExecuteError> {
        // `$EDITOR` may carry arguments, e.g. "code --wait"
        let mut parts = self.editor.split_whitespace();
        let program = parts.next().unwrap_or(DEFAULT_EDITOR);
        let status = Command::new(program)
            .args(parts)
            .arg(file.path())
            .status()
            .map_err(|source| ExecuteError::Launch {
                program: program.to_string(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecuteError::EditorFailed(status))
        }
    }
}
