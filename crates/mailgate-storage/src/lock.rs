//! Mailbox dot-locking
//!
//! A mailbox `<path>` is locked by exclusively creating `<path>.lock`. The
//! lock is advisory: every cooperating delivery agent and mail reader must
//! honor it. Acquisition is retried a bounded number of times with a growing
//! backoff, and lock files older than the configured age are removed as
//! abandoned.
//!
//! The system mail directory is usually writable by the mail group only. A
//! [`LockGroup`] makes that group effective just for creating and removing
//! the lock file.

use mailgate_common::config::LockConfig;
use mailgate_common::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Group credentials needed to create lock files in a mail directory
pub trait LockGroup: fmt::Debug + Send + Sync {
    /// Make the mail group the effective group
    fn raise(&self) -> io::Result<()>;

    /// Restore the recipient's own group as the effective group
    fn lower(&self) -> io::Result<()>;
}

/// Run `op` with `group` raised. Failing to lower again is fatal, the
/// outcome of `op` itself is handed back untouched.
fn with_group<T>(
    group: Option<&dyn LockGroup>,
    op: impl FnOnce() -> io::Result<T>,
) -> Result<io::Result<T>> {
    let Some(group) = group else {
        return Ok(op());
    };

    if let Err(e) = group.raise() {
        debug!(error = %e, "Mail group not available, locking as recipient");
        return Ok(op());
    }
    let outcome = op();
    group
        .lower()
        .map_err(|e| Error::PrivilegeDropFailed(format!("could not lower mail group: {}", e)))?;
    Ok(outcome)
}

/// Lock file path for a mailbox
pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// A held mailbox lock. Dropping the guard removes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    group: Option<Arc<dyn LockGroup>>,
    released: bool,
}

impl LockGuard {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file, reporting failure
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        with_group(self.group.as_deref(), || std::fs::remove_file(&self.path))?.map_err(
            |source| Error::LockRelease {
                path: self.path.clone(),
                source,
            },
        )?;
        debug!(lock = %self.path.display(), "Released mailbox lock");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match with_group(self.group.as_deref(), || std::fs::remove_file(&self.path)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(lock = %self.path.display(), error = %e, "Failed to remove mailbox lock");
            }
            Err(e) => error!(error = %e, "Mail group still effective after unlock"),
        }
    }
}

/// Acquire the dot-lock for `target` within the configured retry budget.
///
/// With a `group`, the lock file is created and removed with that group
/// effective.
pub async fn acquire(
    target: &Path,
    config: &LockConfig,
    group: Option<Arc<dyn LockGroup>>,
) -> Result<LockGuard> {
    let path = lock_path(target);

    for attempt in 0..=config.retries {
        if attempt > 0 {
            tokio::time::sleep(config.backoff(attempt)).await;
        }

        match with_group(group.as_deref(), || try_create(&path))? {
            Ok(()) => {
                debug!(lock = %path.display(), attempt, "Acquired mailbox lock");
                return Ok(LockGuard {
                    path,
                    group,
                    released: false,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if remove_if_stale(&path, config, group.as_deref())?
                    && with_group(group.as_deref(), || try_create(&path))?.is_ok()
                {
                    debug!(lock = %path.display(), attempt, "Acquired mailbox lock after removing stale lock");
                    return Ok(LockGuard {
                        path,
                        group,
                        released: false,
                    });
                }
                debug!(lock = %path.display(), attempt, "Mailbox lock busy");
            }
            Err(e) => {
                warn!(lock = %path.display(), attempt, error = %e, "Could not create mailbox lock");
            }
        }
    }

    Err(Error::LockTimeout(target.to_path_buf()))
}

fn try_create(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;
    writeln!(file, "{}", std::process::id())
}

fn remove_if_stale(path: &Path, config: &LockConfig, group: Option<&dyn LockGroup>) -> Result<bool> {
    let age = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().unwrap_or_default(),
        Err(_) => return Ok(false),
    };

    if age < config.stale_after() {
        return Ok(false);
    }

    match with_group(group, || std::fs::remove_file(path))? {
        Ok(()) => {
            warn!(lock = %path.display(), age_secs = age.as_secs(), "Removed stale mailbox lock");
            Ok(true)
        }
        Err(e) => {
            debug!(lock = %path.display(), error = %e, "Could not remove stale mailbox lock");
            Ok(false)
        }
    }
}
