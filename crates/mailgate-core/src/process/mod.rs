//! Process Module
//!
//! Runs external programs with a fixed minimal environment and resolves the
//! outbound helper programs.

mod helpers;
mod launcher;

pub use helpers::{HelperResolver, CAN_SEND, QUEUE_MAIL, SEND_QUEUE};
pub use launcher::{Launcher, WaitStatus};
