//! Child process launcher
//!
//! Children see exactly two environment variables, `PATH` and `HOME`, and
//! read their standard input from a caller-supplied handle. The launcher
//! waits for the child and returns the raw wait status.

use crate::privilege::RecipientSession;
use mailgate_common::{Error, Result};
use nix::errno::Errno;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

/// Raw wait status of a finished child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus(i32);

impl WaitStatus {
    /// Status reported for a child whose program could not be executed
    pub const EXEC_FAILURE: WaitStatus = WaitStatus(1 << 8);

    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    /// Exit code, if the child exited normally
    pub fn exit_code(&self) -> Option<i32> {
        ExitStatus::from_raw(self.0).code()
    }

    /// Terminating signal, if the child was killed
    pub fn signal(&self) -> Option<i32> {
        ExitStatus::from_raw(self.0).signal()
    }

    /// Exited normally with code 0
    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

impl From<ExitStatus> for WaitStatus {
    fn from(status: ExitStatus) -> Self {
        Self(status.into_raw())
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code(), self.signal()) {
            (Some(code), _) => write!(f, "exit status {}", code),
            (None, Some(signal)) => write!(f, "killed by signal {}", signal),
            (None, None) => write!(f, "wait status {:#x}", self.0),
        }
    }
}

/// Runs programs on behalf of the recipient
#[derive(Debug, Clone)]
pub struct Launcher {
    path: String,
    home: PathBuf,
}

impl Launcher {
    /// Create a launcher handing `PATH=child_path` and `HOME=home` to children
    pub fn new(child_path: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            path: child_path.into(),
            home: home.into(),
        }
    }

    /// Launcher for the recipient of `session`
    pub fn for_session(session: &RecipientSession) -> Self {
        Self::new(
            session.config().helpers.child_path.clone(),
            session.recipient().home.clone(),
        )
    }

    /// Run `argv` with `input` as standard input and wait for it.
    ///
    /// A program that cannot be executed is reported as a child that exited
    /// with status 1; only a failure to create the child is an error.
    pub async fn run(&self, argv: &[OsString], input: Stdio) -> Result<WaitStatus> {
        let Some((program, args)) = argv.split_first() else {
            warn!("Empty command line");
            return Ok(WaitStatus::EXEC_FAILURE);
        };

        let mut child = match Command::new(program)
            .args(args)
            .env_clear()
            .env("PATH", &self.path)
            .env("HOME", &self.home)
            .stdin(input)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => match spawn_error(program, e) {
                Error::ExecFailed { program, source } => {
                    warn!(program = %program, error = %source, "Could not execute program");
                    return Ok(WaitStatus::EXEC_FAILURE);
                }
                other => return Err(other),
            },
        };

        let status = child
            .wait()
            .await
            .map_err(|e| {
                anyhow::anyhow!("waiting for {} failed: {}", Path::new(program).display(), e)
            })?;
        let status = WaitStatus::from(status);

        debug!(program = %Path::new(program).display(), status = %status, "Child finished");
        Ok(status)
    }
}

fn spawn_error(program: &OsStr, source: io::Error) -> Error {
    let errno = source.raw_os_error();
    if errno == Some(Errno::EAGAIN as i32) || errno == Some(Errno::ENOMEM as i32) {
        Error::ForkFailed(source)
    } else {
        Error::ExecFailed {
            program: program.to_string_lossy().into_owned(),
            source,
        }
    }
}
