//! Lexical analysis: splitting an input line into words with variable expansion.

use crate::env::Environment;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A single word of the input line, produced after variable expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The expanded text of the word.
    pub text: String,
    /// Whether the word came from a quoted region.
    ///
    /// Quoting is not implemented yet, so this is always `false`; the field
    /// keeps the token contract stable for when quoting lands (a quoted word
    /// must not be re-split after expansion).
    pub quoted: bool,
}

impl Token {
    fn bare(text: String) -> Self {
        Token {
            text,
            quoted: false,
        }
    }
}

/// Errors that can occur while splitting a line into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line uses a quote character. Quote parsing is a reserved feature;
    /// rejecting it now means adding it later cannot silently change the
    /// meaning of lines that are accepted today.
    UnsupportedQuoting(char),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnsupportedQuoting(ch) => {
                write!(f, "quoting with {ch} is not supported")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Matches a `$NAME` variable reference inside a word.
fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

/// Split one line of input into tokens.
///
/// Words are separated by whitespace. Every `$NAME` reference in a word is
/// replaced with the environment's value for `NAME` (the empty string when
/// unset) and the replacement is then split again, so a variable holding
/// several words contributes several tokens and a variable holding nothing
/// contributes none.
///
/// A blank or whitespace-only line yields zero tokens.
pub fn split_line(line: &str, env: &Environment) -> Result<Vec<Token>, ParseError> {
    if let Some(ch) = line.chars().find(|c| *c == '\'' || *c == '"') {
        return Err(ParseError::UnsupportedQuoting(ch));
    }

    let mut tokens = Vec::new();
    for word in line.split_whitespace() {
        let expanded = expand(word, env);
        for part in expanded.split_whitespace() {
            tokens.push(Token::bare(part.to_string()));
        }
    }
    Ok(tokens)
}

/// Replace every `$NAME` reference in `word` with its environment value.
fn expand(word: &str, env: &Environment) -> String {
    variable_regex()
        .replace_all(word, |caps: &regex::Captures| {
            env.get_var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_with(pairs: &[(&str, &str)]) -> Environment {
        let mut env = Environment {
            vars: HashMap::new(),
            current_dir: std::env::current_dir().unwrap(),
            last_status: 0,
            should_exit: false,
        };
        for (k, v) in pairs {
            env.set_var(*k, *v);
        }
        env
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_simple_words() {
        let tokens = split_line("echo hello world", &env_with(&[])).unwrap();
        assert_eq!(texts(&tokens), vec!["echo", "hello", "world"]);
        assert!(tokens.iter().all(|t| !t.quoted));
    }

    #[test]
    fn test_blank_line_yields_no_tokens() {
        assert!(split_line("", &env_with(&[])).unwrap().is_empty());
        assert!(split_line("   \t  ", &env_with(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_defined_variable_expands_to_value() {
        let env = env_with(&[("GREETING", "hi")]);
        let tokens = split_line("echo $GREETING", &env).unwrap();
        assert_eq!(texts(&tokens), vec!["echo", "hi"]);
    }

    #[test]
    fn test_undefined_variable_expands_to_nothing() {
        let tokens = split_line("echo $NOPE_NOT_SET", &env_with(&[])).unwrap();
        assert_eq!(texts(&tokens), vec!["echo"]);
    }

    #[test]
    fn test_variable_inside_word() {
        let env = env_with(&[("NAME", "world")]);
        let tokens = split_line("echo hello-$NAME!", &env).unwrap();
        assert_eq!(texts(&tokens), vec!["echo", "hello-world!"]);
    }

    #[test]
    fn test_variable_with_spaces_is_resplit() {
        let env = env_with(&[("ARGS", "-l -a")]);
        let tokens = split_line("ls $ARGS", &env).unwrap();
        assert_eq!(texts(&tokens), vec!["ls", "-l", "-a"]);
    }

    #[test]
    fn test_lone_dollar_stays_literal() {
        let tokens = split_line("echo $ $1", &env_with(&[])).unwrap();
        // `$` alone and `$1` are not variable references for this lexer.
        assert_eq!(texts(&tokens), vec!["echo", "$", "$1"]);
    }

    #[test]
    fn test_quotes_are_rejected() {
        let err = split_line("echo 'hello world'", &env_with(&[])).unwrap_err();
        assert_eq!(err, ParseError::UnsupportedQuoting('\''));
        let err = split_line("echo \"hi\"", &env_with(&[])).unwrap_err();
        assert_eq!(err, ParseError::UnsupportedQuoting('"'));
    }

    #[test]
    fn test_pipe_and_background_are_plain_tokens() {
        let tokens = split_line("a | b &", &env_with(&[])).unwrap();
        assert_eq!(texts(&tokens), vec!["a", "|", "b", "&"]);
    }
}
