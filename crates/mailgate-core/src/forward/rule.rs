//! Forward file line classification
//!
//! Lines are classified as raw bytes. Paths, program arguments and printed
//! names keep every byte of the line, whatever its encoding.

use mailgate_common::config::LimitsConfig;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use thiserror::Error;

/// What one forward-file line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardRule {
    /// Blank line or `#` comment
    Comment,
    /// `|program args...`: pipe the message into a program
    Pipe(Vec<OsString>),
    /// `/path`: append the message to an mbox file
    Mailbox(PathBuf),
    /// `user@host`: send outward, or hand back to the MTA
    External(Vec<u8>),
    /// The recipient's own login name: append to the system mailbox
    SelfMailbox,
    /// Any other name, including an empty one: hand back to the MTA
    LocalAlias(Vec<u8>),
}

/// A line that stops interpretation of the rest of the file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("no closing {0} quote")]
    UnterminatedQuote(char),

    #[error("line longer than {0} bytes")]
    LineTooLong(usize),

    #[error("pipe command with more than {0} arguments")]
    TooManyArguments(usize),
}

fn trim_blanks(s: &[u8]) -> &[u8] {
    let blanks = s.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
    &s[blanks..]
}

/// Classify one raw line of the forward file for recipient `login`
pub fn parse_rule(raw: &[u8], login: &str, limits: &LimitsConfig) -> Result<ForwardRule, RuleError> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    if line.len() > limits.max_line_length {
        return Err(RuleError::LineTooLong(limits.max_line_length));
    }

    let line = trim_blanks(line);
    if line.is_empty() || line[0] == b'#' {
        return Ok(ForwardRule::Comment);
    }

    let line = match line[0] {
        quote @ (b'"' | b'\'') => {
            let inner = &line[1..];
            match inner.iter().rposition(|&b| b == quote) {
                Some(end) => &inner[..end],
                None => return Err(RuleError::UnterminatedQuote(quote as char)),
            }
        }
        _ => line,
    };

    let line = trim_blanks(line);
    let line = line.strip_prefix(b"\\").unwrap_or(line);

    if let Some(command) = line.strip_prefix(b"|") {
        let argv: Vec<OsString> = command
            .split(|b| b.is_ascii_whitespace())
            .filter(|word| !word.is_empty())
            .map(|word| OsStr::from_bytes(word).to_os_string())
            .collect();
        if argv.len() > limits.max_pipe_args {
            return Err(RuleError::TooManyArguments(limits.max_pipe_args));
        }
        Ok(ForwardRule::Pipe(argv))
    } else if line.starts_with(b"/") {
        Ok(ForwardRule::Mailbox(PathBuf::from(OsStr::from_bytes(line))))
    } else if line.contains(&b'@') {
        Ok(ForwardRule::External(line.to_vec()))
    } else if line == login.as_bytes() {
        Ok(ForwardRule::SelfMailbox)
    } else {
        Ok(ForwardRule::LocalAlias(line.to_vec()))
    }
}
