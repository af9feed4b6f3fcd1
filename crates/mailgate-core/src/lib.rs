//! mailgate Core - Local mail delivery
//!
//! This crate provides the privilege gate, the process launcher, the forward
//! rule interpreter and the delivery orchestrator that ties them together.

pub mod delivery;
pub mod forward;
pub mod privilege;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

pub use delivery::{Delivery, Outcome};
pub use forward::{parse_rule, ForwardInterpreter, ForwardRule, InterpretReport, RuleError};
pub use privilege::{
    AccountDirectory, AccountRecord, IdentitySwitch, MailGroup, NormalizedMailbox,
    PrivilegedSession, RecipientSession, ShellList, SystemAccounts, SystemSwitch,
};
pub use process::{HelperResolver, Launcher, WaitStatus};
