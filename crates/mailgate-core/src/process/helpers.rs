//! Outbound helper lookup
//!
//! Helpers are looked up by fixed name, first in the recipient's override
//! directory, then in the system directory. A helper counts as present only
//! when it is a file with the owner-execute bit set.

use crate::privilege::RecipientSession;
use mailgate_common::config::HelperConfig;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decides whether this message may be sent outward
pub const CAN_SEND: &str = "can-send";
/// Queues a message for the collected external addresses
pub const QUEUE_MAIL: &str = "queue-mail";
/// Flushes the outbound queue
pub const SEND_QUEUE: &str = "send-queue";

/// Finds helper programs for one recipient
#[derive(Debug, Clone)]
pub struct HelperResolver {
    dirs: [PathBuf; 2],
}

impl HelperResolver {
    pub fn new(home: &Path, config: &HelperConfig) -> Self {
        Self {
            dirs: [home.join(&config.user_dir), config.system_dir.clone()],
        }
    }

    pub fn for_session(session: &RecipientSession) -> Self {
        Self::new(&session.recipient().home, &session.config().helpers)
    }

    /// Path of the helper `name`, if one is installed
    pub async fn find(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.dirs {
            let candidate = dir.join(name);
            if is_owner_executable(&candidate).await {
                debug!(helper = name, path = %candidate.display(), "Found helper");
                return Some(candidate);
            }
        }
        debug!(helper = name, "Helper not installed");
        None
    }
}

async fn is_owner_executable(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o100 != 0,
        Err(_) => false,
    }
}
