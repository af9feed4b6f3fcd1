//! Credential switching

use mailgate_common::{Error, Result};
use mailgate_storage::LockGroup;
use nix::unistd::{getegid, geteuid, getuid, setegid, setgroups, setresgid, setresuid, Gid, Uid};
use std::io;
use tracing::debug;

/// Irreversibly replaces the process credentials
pub trait IdentitySwitch {
    /// Become `uid`/`gid` for good, keeping `lock_gid` only as the saved
    /// group id so [`MailGroup`] can raise it for lock files
    fn assume(&self, uid: u32, gid: u32, lock_gid: u32) -> Result<()>;
}

/// Switches the real, effective and saved ids of this process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSwitch;

impl IdentitySwitch for SystemSwitch {
    fn assume(&self, uid: u32, gid: u32, lock_gid: u32) -> Result<()> {
        let new_uid = Uid::from_raw(uid);
        let new_gid = Gid::from_raw(gid);
        let lock_gid = Gid::from_raw(lock_gid);

        if getuid() == new_uid && geteuid() == new_uid {
            debug!(uid, "Already running as recipient");
            return Ok(());
        }

        let old_uid = geteuid();
        let old_gid = getegid();

        // The mail group never becomes a supplementary group: children
        // would inherit it.
        setgroups(&[new_gid]).map_err(|e| {
            Error::PrivilegeDropFailed(format!("setgroups failed: {}", e))
        })?;
        setresgid(new_gid, new_gid, lock_gid).map_err(|e| {
            Error::PrivilegeDropFailed(format!("setresgid({}) failed: {}", gid, e))
        })?;
        setresuid(new_uid, new_uid, new_uid).map_err(|e| {
            Error::PrivilegeDropFailed(format!("setresuid({}) failed: {}", uid, e))
        })?;

        // The old ids must be out of reach now.
        if old_gid != new_gid && old_gid != lock_gid && setresgid(old_gid, old_gid, old_gid).is_ok() {
            return Err(Error::PrivilegeDropFailed(format!(
                "group {} could be regained",
                old_gid
            )));
        }
        if new_uid != old_uid && setresuid(old_uid, old_uid, old_uid).is_ok() {
            return Err(Error::PrivilegeDropFailed(format!(
                "user {} could be regained",
                old_uid
            )));
        }

        debug!(uid, gid, lock_gid = lock_gid.as_raw(), "Dropped privileges");
        Ok(())
    }
}

/// Toggles the effective group between the recipient's group and the mail
/// group held as saved group id.
///
/// Exec copies the effective group into the saved one, so a child started
/// while the group is lowered has no way back to the mail group.
#[derive(Debug, Clone, Copy)]
pub struct MailGroup {
    mail: Gid,
    own: Gid,
}

impl MailGroup {
    pub fn new(mail_gid: u32, own_gid: u32) -> Self {
        Self {
            mail: Gid::from_raw(mail_gid),
            own: Gid::from_raw(own_gid),
        }
    }
}

impl LockGroup for MailGroup {
    fn raise(&self) -> io::Result<()> {
        setegid(self.mail).map_err(io::Error::from)
    }

    fn lower(&self) -> io::Result<()> {
        setegid(self.own).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_assume_current_identity_is_noop() {
        let uid = getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        if geteuid().as_raw() == uid {
            SystemSwitch.assume(uid, gid, gid).unwrap();
            assert_eq!(geteuid().as_raw(), uid);
        }
    }

    #[test]
    fn test_mail_group_round_trip_on_own_group() {
        let gid = getegid();
        let group = MailGroup::new(gid.as_raw(), gid.as_raw());

        group.raise().unwrap();
        assert_eq!(getegid(), gid);
        group.lower().unwrap();
        assert_eq!(getegid(), gid);
    }
}
