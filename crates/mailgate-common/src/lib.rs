//! mailgate Common - Shared types and utilities
//!
//! This crate provides the configuration, error taxonomy and identity types
//! shared by every mailgate component.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{CallerIdentity, Command, Invocation, RecipientIdentity};
