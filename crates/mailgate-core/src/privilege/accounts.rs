//! Account lookups

use mailgate_common::Result;
use nix::unistd::{Uid, User};
use std::path::PathBuf;

/// One entry of the system account database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl From<User> for AccountRecord {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
            shell: user.shell,
        }
    }
}

/// Source of account information
pub trait AccountDirectory {
    /// Look an account up by login name
    fn by_name(&self, name: &str) -> Result<Option<AccountRecord>>;

    /// Look an account up by uid
    fn by_uid(&self, uid: u32) -> Result<Option<AccountRecord>>;
}

/// The system account database (`getpwnam(3)` / `getpwuid(3)`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccounts;

impl AccountDirectory for SystemAccounts {
    fn by_name(&self, name: &str) -> Result<Option<AccountRecord>> {
        let user = User::from_name(name)
            .map_err(|e| anyhow::anyhow!("getpwnam({}) failed: {}", name, e))?;
        Ok(user.map(AccountRecord::from))
    }

    fn by_uid(&self, uid: u32) -> Result<Option<AccountRecord>> {
        let user = User::from_uid(Uid::from_raw(uid))
            .map_err(|e| anyhow::anyhow!("getpwuid({}) failed: {}", uid, e))?;
        Ok(user.map(AccountRecord::from))
    }
}
