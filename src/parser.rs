//! Grouping tokens into a pipeline of commands.

use crate::lexer::Token;
use std::fmt;

/// One executable step of a pipeline: a program name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The program to run (builtin name or external program).
    pub program: String,
    /// Arguments, excluding the program name itself.
    pub args: Vec<String>,
}

/// An ordered sequence of commands connected by pipes.
///
/// `commands[i]`'s stdout feeds `commands[i + 1]`'s stdin. A pipeline always
/// contains at least one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
    /// Run without blocking the prompt.
    pub background: bool,
    /// The original input line, kept for job reporting.
    pub line: String,
}

/// Errors that can occur while grouping tokens into a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// A pipe separator with no command before or after it.
    EmptyStage,
    /// A background marker somewhere other than the end of the line.
    StrayBackground,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::EmptyStage => write!(f, "syntax error near `|`"),
            SyntaxError::StrayBackground => write!(f, "syntax error near `&`"),
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Build a [`Pipeline`] from the token sequence of one input line.
///
/// Tokens are split into successive commands on the `|` separator; a trailing
/// `&` marks the whole pipeline for background execution and is removed from
/// the argument list. Zero tokens mean there is nothing to run and `Ok(None)`
/// is returned so the caller can go straight back to the prompt.
pub fn build_pipeline(line: &str, tokens: Vec<Token>) -> Result<Option<Pipeline>, SyntaxError> {
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut words: Vec<String> = tokens.into_iter().map(|t| t.text).collect();

    let background = words.last().is_some_and(|w| w == "&");
    if background {
        words.pop();
        if words.is_empty() {
            return Err(SyntaxError::StrayBackground);
        }
    }
    // `&` is only recognized in the trailing position.
    if words.iter().any(|w| w == "&") {
        return Err(SyntaxError::StrayBackground);
    }

    let mut commands = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for word in words {
        if word == "|" {
            commands.push(take_command(&mut current)?);
        } else {
            current.push(word);
        }
    }
    commands.push(take_command(&mut current)?);

    Ok(Some(Pipeline {
        commands,
        background,
        line: line.trim().to_string(),
    }))
}

/// Drain the accumulated words into a [`Command`], failing on an empty stage.
fn take_command(words: &mut Vec<String>) -> Result<Command, SyntaxError> {
    if words.is_empty() {
        return Err(SyntaxError::EmptyStage);
    }
    let mut drained = std::mem::take(words).into_iter();
    let program = drained.next().expect("checked non-empty");
    Ok(Command {
        program,
        args: drained.collect(),
    })
}
