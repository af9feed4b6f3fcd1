//! Message spool
//!
//! The incoming message is copied once into an anonymous temporary file.
//! Every consumer (mailbox append, pipe rule, helper program) gets its own
//! handle positioned at the start of the message.

use mailgate_common::{Error, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// A fully buffered message, read-only once spooled
#[derive(Debug)]
pub struct SpooledMessage {
    file: File,
    len: u64,
}

impl SpooledMessage {
    /// Copy `input` to an anonymous file in `dir` until end of input.
    ///
    /// Any read error is fatal; the message is never silently truncated.
    pub async fn spool<R>(input: &mut R, dir: &Path, max_size: Option<u64>) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let file = tempfile::tempfile_in(dir)
            .map_err(|e| Error::Spool(format!("Could not open temporary file: {}", e)))?;
        let writer = file
            .try_clone()
            .map_err(|e| Error::Spool(format!("Could not duplicate spool handle: {}", e)))?;
        let mut writer = tokio::fs::File::from_std(writer);

        let len = match max_size {
            Some(limit) => {
                let mut limited = input.take(limit.saturating_add(1));
                let len = tokio::io::copy(&mut limited, &mut writer)
                    .await
                    .map_err(|e| Error::Spool(format!("Error copying to temporary file: {}", e)))?;
                if len > limit {
                    return Err(Error::Spool(format!(
                        "Message exceeds the {} byte limit",
                        limit
                    )));
                }
                len
            }
            None => tokio::io::copy(input, &mut writer)
                .await
                .map_err(|e| Error::Spool(format!("Error copying to temporary file: {}", e)))?,
        };

        writer
            .flush()
            .await
            .map_err(|e| Error::Spool(format!("Error copying to temporary file: {}", e)))?;

        debug!(size = len, "Spooled message");

        Ok(Self { file, len })
    }

    /// Size of the message in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the message is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A handle on the spool, rewound to the first byte
    pub fn rewound(&self) -> Result<File> {
        let mut handle = self
            .file
            .try_clone()
            .map_err(|e| Error::Spool(format!("Could not duplicate spool handle: {}", e)))?;
        handle
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::Spool(format!("Could not rewind spool: {}", e)))?;
        Ok(handle)
    }

    /// An async reader over the whole message
    pub fn reader(&self) -> Result<tokio::fs::File> {
        Ok(tokio::fs::File::from_std(self.rewound()?))
    }

    /// The whole message as a child's standard input
    pub fn stdin(&self) -> Result<Stdio> {
        Ok(Stdio::from(self.rewound()?))
    }
}
