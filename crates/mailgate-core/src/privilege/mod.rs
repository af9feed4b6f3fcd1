//! Privilege Gate Module
//!
//! Checks that the recipient may receive mail, normalizes the system mailbox
//! while still privileged, and performs the one-way switch to the recipient.

mod accounts;
mod gate;
mod shells;
mod switch;

pub use accounts::{AccountDirectory, AccountRecord, SystemAccounts};
pub use gate::{NormalizedMailbox, PrivilegedSession, RecipientSession};
pub use shells::ShellList;
pub use switch::{IdentitySwitch, MailGroup, SystemSwitch};
