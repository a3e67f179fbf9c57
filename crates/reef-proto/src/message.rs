//! The parsed IRC line.
//!
//! A [`Message`] is an immutable view of one protocol line: optional
//! prefix, uppercased command token, up to fourteen middle parameters, and
//! an optional trailing parameter that may contain spaces. `FromStr`
//! parses, `Display` serializes; for every canonical line the two are
//! inverses of each other.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Middle parameters are capped at fourteen; the fifteenth becomes the
/// trailing parameter per RFC 1459 §2.3.
const MAX_MIDDLE_PARAMS: usize = 14;

/// A parsed IRC message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Originator, without the leading `:` (e.g. `nick!user@host`).
    pub prefix: Option<String>,
    /// Command token, uppercased on parse (`PRIVMSG`, `001`, ...).
    pub command: String,
    /// Middle parameters, in order.
    pub params: Vec<String>,
    /// Trailing parameter; the only one that may contain spaces.
    pub trailing: Option<String>,
}

impl Message {
    /// Start a message with the given command token.
    pub fn cmd(command: impl Into<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params: Vec::new(),
            trailing: None,
        }
    }

    /// Append a middle parameter.
    #[must_use]
    pub fn param(mut self, p: impl Into<String>) -> Self {
        self.params.push(p.into());
        self
    }

    /// Set the trailing parameter.
    #[must_use]
    pub fn trailing(mut self, t: impl Into<String>) -> Self {
        self.trailing = Some(t.into());
        self
    }

    /// Set the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Middle parameter by index.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str)
    }

    /// The payload of a command: the trailing parameter if present,
    /// otherwise the middle parameter at `i`.
    pub fn text_or_arg(&self, i: usize) -> Option<&str> {
        self.trailing.as_deref().or_else(|| self.arg(i))
    }

    /// Total parameter count, trailing included. The dispatcher's arity
    /// check counts against this.
    pub fn param_count(&self) -> usize {
        self.params.len() + usize::from(self.trailing.is_some())
    }
}

/// Why a line failed to parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing but whitespace (or a bare prefix). Discarded silently.
    #[error("empty message")]
    Empty,
    /// Command token is neither letters nor a three-digit numeric.
    #[error("malformed command token: {0:?}")]
    BadCommand(String),
}

fn is_command_token(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    s.chars().all(|c| c.is_ascii_alphabetic())
        || (s.len() == 3 && s.chars().all(|c| c.is_ascii_digit()))
}

impl FromStr for Message {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        let mut rest = s.trim_end_matches(['\r', '\n']);

        let mut prefix = None;
        if let Some(tail) = rest.strip_prefix(':') {
            // A prefix with no command after it is an empty message.
            let (p, tail) = tail.split_once(' ').ok_or(ParseError::Empty)?;
            prefix = Some(p.to_string());
            rest = tail;
        }

        rest = rest.trim_start_matches(' ');
        let (cmd, mut rest) = match rest.split_once(' ') {
            Some((c, tail)) => (c, tail),
            None => (rest, ""),
        };
        if cmd.is_empty() {
            return Err(ParseError::Empty);
        }
        if !is_command_token(cmd) {
            return Err(ParseError::BadCommand(cmd.to_string()));
        }

        let mut params = Vec::new();
        let mut trailing = None;
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(t) = rest.strip_prefix(':') {
                trailing = Some(t.to_string());
                break;
            }
            if params.len() == MAX_MIDDLE_PARAMS {
                trailing = Some(rest.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, tail)) => {
                    params.push(p.to_string());
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: cmd.to_ascii_uppercase(),
            params,
            trailing,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        for p in &self.params {
            write!(f, " {p}")?;
        }
        if let Some(t) = &self.trailing {
            write!(f, " :{t}")?;
        }
        Ok(())
    }
}
