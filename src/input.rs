//! Line accumulation and command parsing for the interactive prompt

const FENCE: &str = "\"\"\"";

/// What the prompt should do with a complete input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Clear,
    Regenerate,
    Submit(String),
}

/// Result of feeding one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStep {
    /// Inside a multi-line block, keep reading
    Continue,
    /// Blank line outside a block
    Ignore,
    Command(Command),
}

/// Accumulates lines between `"""` fences into one message
#[derive(Debug, Default)]
pub struct InputBuffer {
    lines: Option<Vec<String>>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_multiline(&self) -> bool {
        self.lines.is_some()
    }

    /// Drop a partially entered block
    pub fn reset(&mut self) {
        self.lines = None;
    }

    pub fn feed(&mut self, line: &str) -> InputStep {
        if let Some(lines) = self.lines.as_mut() {
            if line.trim_end() == FENCE {
                let text = lines.join("\n");
                self.lines = None;
                return submit(text);
            }
            lines.push(line.to_string());
            return InputStep::Continue;
        }

        let trimmed = line.trim();
        match trimmed {
            FENCE => {
                self.lines = Some(Vec::new());
                InputStep::Continue
            }
            "" => InputStep::Ignore,
            ":q" | ":quit" => InputStep::Command(Command::Quit),
            ":c" | ":clear" => InputStep::Command(Command::Clear),
            ":r" | ":regenerate" => InputStep::Command(Command::Regenerate),
            _ => submit(line.to_string()),
        }
    }
}

fn submit(text: String) -> InputStep {
    if text.trim().is_empty() {
        InputStep::Ignore
    } else {
        InputStep::Command(Command::Submit(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(buffer: &mut InputBuffer, lines: &[&str]) -> Vec<InputStep> {
        lines.iter().map(|line| buffer.feed(line)).collect()
    }

    #[test]
    fn test_commands() {
        let mut buffer = InputBuffer::new();
        assert_eq!(buffer.feed(":q"), InputStep::Command(Command::Quit));
        assert_eq!(buffer.feed(":quit"), InputStep::Command(Command::Quit));
        assert_eq!(buffer.feed(" :c "), InputStep::Command(Command::Clear));
        assert_eq!(buffer.feed(":regenerate"), InputStep::Command(Command::Regenerate));
        assert_eq!(buffer.feed("   "), InputStep::Ignore);
    }

    #[test]
    fn test_plain_line_is_submitted_verbatim() {
        let mut buffer = InputBuffer::new();
        assert_eq!(
            buffer.feed("what is  :q?"),
            InputStep::Command(Command::Submit("what is  :q?".to_string()))
        );
    }

    #[test]
    fn test_multiline_block() {
        let mut buffer = InputBuffer::new();
        let steps = feed_all(&mut buffer, &["\"\"\"", "fn main() {", "", "}", "\"\"\""]);
        assert_eq!(steps[..4], [InputStep::Continue, InputStep::Continue, InputStep::Continue, InputStep::Continue]);
        assert_eq!(
            steps[4],
            InputStep::Command(Command::Submit("fn main() {\n\n}".to_string()))
        );
        assert!(!buffer.in_multiline());
    }

    #[test]
    fn test_commands_are_text_inside_block() {
        let mut buffer = InputBuffer::new();
        buffer.feed("\"\"\"");
        assert_eq!(buffer.feed(":q"), InputStep::Continue);
        assert!(buffer.in_multiline());
        assert_eq!(
            buffer.feed("\"\"\""),
            InputStep::Command(Command::Submit(":q".to_string()))
        );
    }

    #[test]
    fn test_empty_block_is_ignored() {
        let mut buffer = InputBuffer::new();
        assert_eq!(feed_all(&mut buffer, &["\"\"\"", "  ", "\"\"\""])[2], InputStep::Ignore);
    }

    #[test]
    fn test_reset_discards_block() {
        let mut buffer = InputBuffer::new();
        feed_all(&mut buffer, &["\"\"\"", "half a thought"]);
        buffer.reset();
        assert!(!buffer.in_multiline());
        assert_eq!(buffer.feed(":r"), InputStep::Command(Command::Regenerate));
    }
}
