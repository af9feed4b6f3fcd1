//! Common types for mailgate

use std::fmt;
use std::path::PathBuf;

/// Command requested by the MTA
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Deliver locally, never send outward
    Deliver,
    /// Deliver, and send outward when `can-send` allows it
    Forward,
    /// Hand the message to the `send-queue` helper
    Send,
    /// Anything else; the gate still runs, then the delivery ends with 66
    Unknown(String),
}

impl Command {
    /// Parse a command word
    pub fn parse(word: &str) -> Self {
        match word {
            "deliver" => Command::Deliver,
            "forward" => Command::Forward,
            "send" => Command::Send,
            other => Command::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Deliver => f.write_str("deliver"),
            Command::Forward => f.write_str("forward"),
            Command::Send => f.write_str("send"),
            Command::Unknown(word) => f.write_str(word),
        }
    }
}

/// One invocation of the delivery agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub recipient: String,
}

impl Invocation {
    /// Build an invocation from the process arguments, program name excluded.
    /// Extra arguments are ignored.
    pub fn from_args<I, S>(args: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        match (args.next(), args.next()) {
            (Some(command), Some(recipient)) => Ok(Self {
                command: Command::parse(&command),
                recipient,
            }),
            _ => Err(crate::Error::InvalidInvocation(
                "Not enough arguments".to_string(),
            )),
        }
    }
}

/// Account that receives the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientIdentity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

/// Account that invoked the delivery agent; only used as envelope sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_invocation_from_args() {
        let inv = Invocation::from_args(["forward", "alice", "ignored"]).unwrap();
        assert_eq!(inv.command, Command::Forward);
        assert_eq!(inv.recipient, "alice");
    }

    #[test]
    fn test_invocation_requires_two_arguments() {
        let err = Invocation::from_args(["deliver"]).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(Invocation::from_args(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_command_parse_is_exact() {
        assert_eq!(Command::parse("deliver"), Command::Deliver);
        assert_eq!(Command::parse("send"), Command::Send);
        assert_eq!(
            Command::parse("delivery"),
            Command::Unknown("delivery".to_string())
        );
        assert_eq!(Command::parse("delivery").to_string(), "delivery");
    }
}
