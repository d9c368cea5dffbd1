//! Types needed for parsing.

use drill_core::{
    config::{Config, ConfigError},
    script::{Event, EventKind, Script, TimeRuleError, TimeSpec},
};
use nom::{
    error::{VerboseError, VerboseErrorKind},
    IResult,
};
use thiserror::Error as ThisError;

pub type Res<T, U> = IResult<T, U, VerboseError<T>>;

/// Stops the parse with a semantic error. Failures are not retried by
/// `alt`, so the message reaches the caller unchanged.
pub fn semantic<'a, T>(input: &'a str, message: &'static str) -> Res<&'a str, T> {
    Err(nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(message))],
    }))
}

/// Everything the parser tracks between lines: the settings the option
/// block has built up so far, the script being built, and where we are.
#[derive(Debug, Clone)]
pub struct ParseContext {
    config: Config,
    script: Script,
    line: usize,
}

impl ParseContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            script: Script::default(),
            line: 0,
        }
    }

    /// The 1-based number of the line being parsed
    pub fn line(&self) -> usize {
        self.line
    }

    pub(super) fn next_line(&mut self) {
        self.line += 1;
    }

    pub(super) fn add_option(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        if !self.script.events.is_empty() {
            Err(self.error(ParseErrorKind::LateOption))?
        }
        self.config
            .apply_option(name, value)
            .map_err(|e| self.error(e.into()))?;
        self.script
            .options
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub(super) fn add_event(&mut self, time: TimeSpec, kind: EventKind) -> Result<(), ParseError> {
        let event = Event {
            line: self.line,
            number: self.script.events.len(),
            time,
            kind,
        };
        event.check_time().map_err(|e| self.error(e.into()))?;
        self.script.events.push(event);
        Ok(())
    }

    pub(super) fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            line: self.line,
            kind,
        }
    }

    pub fn finish(self) -> (Script, Config) {
        (self.script, self.config)
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
#[error("Line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("syntax error near '{0}'")]
    Syntax(String),
    #[error("syntax error at end of line")]
    UnexpectedEnd,
    #[error("{0}")]
    Semantic(&'static str),
    #[error("{0}")]
    Time(#[from] TimeRuleError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("options must come before the first event")]
    LateOption,
}

impl ParseErrorKind {
    /// Sorts a nom error into a semantic error raised by [`semantic`] or a
    /// plain syntax error pointing at where parsing stopped.
    pub fn from_nom(error: nom::Err<VerboseError<&str>>) -> Self {
        let errors = match error {
            nom::Err::Incomplete(_) => return Self::UnexpectedEnd,
            nom::Err::Error(e) => e.errors,
            nom::Err::Failure(e) => match e.errors.first() {
                Some((_, VerboseErrorKind::Context(message))) => {
                    return Self::Semantic(*message)
                }
                _ => e.errors,
            },
        };
        match errors.first() {
            Some((rest, _)) if !rest.trim().is_empty() => {
                Self::Syntax(rest.trim().chars().take(24).collect())
            }
            _ => Self::UnexpectedEnd,
        }
    }
}
