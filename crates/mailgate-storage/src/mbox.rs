//! mbox append
//!
//! A delivery appends one `From <sender> <date>` envelope line, the message
//! bytes exactly as received, and a trailing blank line. The append runs
//! under the mailbox dot-lock. A write error part way through leaves the
//! bytes already written in place.

use crate::lock::{self, LockGroup};
use crate::spool::SpooledMessage;
use chrono::{DateTime, Local};
use mailgate_common::config::LockConfig;
use mailgate_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Envelope line in `ctime(3)` layout, newline included
pub fn envelope_line(sender: &str, at: DateTime<Local>) -> String {
    format!("From {} {}\n", sender, at.format("%a %b %e %H:%M:%S %Y"))
}

/// Lock-protected mbox writer
#[derive(Debug, Clone)]
pub struct MailboxWriter {
    lock: LockConfig,
    group: Option<Arc<dyn LockGroup>>,
}

impl MailboxWriter {
    /// Create a new mailbox writer
    pub fn new(lock: LockConfig) -> Self {
        Self { lock, group: None }
    }

    /// Create lock files with `group` raised
    pub fn with_lock_group(mut self, group: Arc<dyn LockGroup>) -> Self {
        self.group = Some(group);
        self
    }

    /// Append `message` to the mailbox at `target`, returning the number of
    /// bytes written
    pub async fn append(
        &self,
        target: &Path,
        message: &SpooledMessage,
        sender: &str,
    ) -> Result<u64> {
        let guard = lock::acquire(target, &self.lock, self.group.clone()).await?;

        match self.write_locked(target, message, sender).await {
            Ok(written) => {
                guard.release()?;
                info!(mailbox = %target.display(), size = written, "Appended message");
                Ok(written)
            }
            Err(e) => {
                if let Err(release) = guard.release() {
                    warn!(error = %release, "Lock release failed after write error");
                }
                Err(e)
            }
        }
    }

    async fn write_locked(
        &self,
        target: &Path,
        message: &SpooledMessage,
        sender: &str,
    ) -> Result<u64> {
        let mut mbox = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .mode(0o600)
            .open(target)
            .await
            .map_err(|source| Error::OpenFailed {
                path: target.to_path_buf(),
                source,
            })?;

        let write_failed = |source| Error::WriteFailed {
            path: target.to_path_buf(),
            source,
        };

        let envelope = envelope_line(sender, Local::now());
        mbox.write_all(envelope.as_bytes())
            .await
            .map_err(write_failed)?;

        let mut body = message.reader()?;
        let copied = tokio::io::copy(&mut body, &mut mbox)
            .await
            .map_err(write_failed)?;

        mbox.write_all(b"\n").await.map_err(write_failed)?;
        mbox.flush().await.map_err(write_failed)?;

        debug!(mailbox = %target.display(), body = copied, "Wrote mbox entry");

        Ok(envelope.len() as u64 + copied + 1)
    }
}
