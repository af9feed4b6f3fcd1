//! Delivery Module
//!
//! Sequences one delivery after the privilege drop: spool the message, then
//! either append it to the mailbox, run the forward file, or hand it to the
//! outbound queue.

mod orchestrator;

pub use orchestrator::{Delivery, Outcome};
