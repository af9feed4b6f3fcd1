//! Error types for mailgate

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for mailgate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("Forbidden recipient: {0}")]
    ForbiddenRecipient(String),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Unknown caller uid {0}")]
    UnknownCaller(u32),

    #[error("Receiver {0} not allowed to log in")]
    RecipientNotLoginEnabled(String),

    #[error("Unacceptable owner or mode on mailbox {0}")]
    UnsafeMailbox(PathBuf),

    #[error("Could not create mailbox {path}: {source}")]
    MailboxCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Privilege drop failed: {0}")]
    PrivilegeDropFailed(String),

    #[error("Could not lock mailbox {0}")]
    LockTimeout(PathBuf),

    #[error("Could not release lock {path}: {source}")]
    LockRelease {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not open mailbox {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Write to mailbox {path} failed: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Spool error: {0}")]
    Spool(String),

    #[error("Forward file {path} unreadable: {source}")]
    ForwardFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Outbound queue handoff failed: {0}")]
    QueueHandoffFailed(String),

    #[error("Helper {0} not found")]
    HelperNotFound(&'static str),

    #[error("Fork failed: {0}")]
    ForkFailed(#[source] io::Error),

    #[error("Could not execute {program}: {source}")]
    ExecFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for mailgate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InvalidInvocation(_) => 1,
            Error::ForbiddenRecipient(_) => 2,
            Error::UnknownRecipient(_) => 3,
            Error::UnknownCaller(_) => 3,
            Error::RecipientNotLoginEnabled(_) => 1,
            Error::UnsafeMailbox(_) => 1,
            Error::MailboxCreate { .. } => 1,
            Error::PrivilegeDropFailed(_) => 4,
            Error::LockTimeout(_) => 13,
            Error::LockRelease { .. } => 1,
            Error::OpenFailed { .. } => 3,
            Error::WriteFailed { .. } => 1,
            Error::Spool(_) => 1,
            Error::ForwardFile { .. } => 1,
            Error::QueueHandoffFailed(_) => 66,
            Error::HelperNotFound(_) => 55,
            Error::ForkFailed(_) => 123,
            Error::ExecFailed { .. } => 1,
            Error::Config(_) => 1,
            Error::Other(_) => 1,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInvocation(_) => "INVALID_INVOCATION",
            Error::ForbiddenRecipient(_) => "FORBIDDEN_RECIPIENT",
            Error::UnknownRecipient(_) => "UNKNOWN_RECIPIENT",
            Error::UnknownCaller(_) => "UNKNOWN_CALLER",
            Error::RecipientNotLoginEnabled(_) => "RECIPIENT_NOT_LOGIN_ENABLED",
            Error::UnsafeMailbox(_) => "UNSAFE_MAILBOX",
            Error::MailboxCreate { .. } => "MAILBOX_CREATE",
            Error::PrivilegeDropFailed(_) => "PRIVILEGE_DROP_FAILED",
            Error::LockTimeout(_) => "LOCK_TIMEOUT",
            Error::LockRelease { .. } => "LOCK_RELEASE",
            Error::OpenFailed { .. } => "OPEN_FAILED",
            Error::WriteFailed { .. } => "WRITE_FAILED",
            Error::Spool(_) => "SPOOL_ERROR",
            Error::ForwardFile { .. } => "FORWARD_FILE",
            Error::QueueHandoffFailed(_) => "QUEUE_HANDOFF_FAILED",
            Error::HelperNotFound(_) => "HELPER_NOT_FOUND",
            Error::ForkFailed(_) => "FORK_FAILED",
            Error::ExecFailed { .. } => "EXEC_FAILED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
