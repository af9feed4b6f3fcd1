//! mailgate Storage - Mailbox and spool handling
//!
//! This crate provides the lock-protected mbox writer, the dot-lock used to
//! serialize concurrent deliveries, and the spool that buffers one message.

pub mod lock;
pub mod mbox;
pub mod spool;

pub use lock::{lock_path, LockGroup, LockGuard};
pub use mbox::{envelope_line, MailboxWriter};
pub use spool::SpooledMessage;
