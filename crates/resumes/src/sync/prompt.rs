//! Interactive questions asked during a run

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Source of answers to interactive questions
pub trait Prompt {
    /// Ask `question` and return the trimmed answer (empty when skipped)
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// Asks on stdout and reads answers from stdin
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{} ", question)?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read answer from stdin")?;
        Ok(answer.trim().to_string())
    }
}

/// Replays fixed answers; answers "" once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Questions asked so far
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.asked.push(question.to_string());
        Ok(self.answers.pop_front().unwrap_or_default())
    }
}

/// Whether an answer means yes (`y` or `yes`, any case)
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
