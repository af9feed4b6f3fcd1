//! Forward Rule Module
//!
//! Classifies the lines of a recipient's forward file and carries out the
//! resulting actions in file order.

mod interpreter;
mod rule;

pub use interpreter::{forward_file, ForwardInterpreter, InterpretReport};
pub use rule::{parse_rule, ForwardRule, RuleError};
