//! Privileged → recipient session transition
//!
//! [`PrivilegedSession`] exists only while the process still holds its
//! elevated credentials. It is the only place that can normalize the system
//! mailbox, and it is consumed by [`PrivilegedSession::drop_privileges`],
//! which hands back a [`RecipientSession`]. Everything that reads
//! recipient-controlled files takes a `RecipientSession`.

use super::accounts::AccountDirectory;
use super::shells::ShellList;
use super::switch::{IdentitySwitch, MailGroup};
use mailgate_common::config::Config;
use mailgate_common::{CallerIdentity, Command, Error, Invocation, RecipientIdentity, Result};
use mailgate_storage::{LockGroup, MailboxWriter};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Mode bits checked on a mailbox: owner and other, group left to the mail group
const MAILBOX_MODE_MASK: u32 = 0o707;
const MAILBOX_MODE: u32 = 0o600;

/// Eligible invocation, still running with elevated privilege
#[derive(Debug)]
pub struct PrivilegedSession {
    config: Arc<Config>,
    command: Command,
    recipient: RecipientIdentity,
    caller: CallerIdentity,
}

/// Proof that the recipient's system mailbox passed normalization
#[derive(Debug)]
pub struct NormalizedMailbox {
    path: PathBuf,
}

impl NormalizedMailbox {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PrivilegedSession {
    /// Resolve identities and check that the recipient may receive mail
    pub fn open(
        config: Arc<Config>,
        invocation: Invocation,
        accounts: &dyn AccountDirectory,
        caller_uid: u32,
    ) -> Result<Self> {
        let delivery = &config.delivery;
        let name = invocation.recipient;

        if delivery.deny_root && name == "root" {
            return Err(Error::ForbiddenRecipient(name));
        }

        let account = match accounts.by_name(&name) {
            Ok(Some(account)) => account,
            Ok(None) => return Err(Error::UnknownRecipient(name)),
            Err(e) => {
                warn!(recipient = %name, error = %e, "Account lookup failed");
                return Err(Error::UnknownRecipient(name));
            }
        };

        let below_min = account.uid < delivery.min_uid;
        let forbidden = if delivery.deny_root {
            below_min
        } else {
            below_min && account.uid != 0
        };
        if forbidden {
            return Err(Error::ForbiddenRecipient(name));
        }

        let shells = ShellList::load(&delivery.shells_file);
        if !shells.contains(&account.shell) {
            return Err(Error::RecipientNotLoginEnabled(name));
        }

        let caller = match accounts.by_uid(caller_uid) {
            Ok(Some(caller)) => caller,
            Ok(None) => return Err(Error::UnknownCaller(caller_uid)),
            Err(e) => {
                warn!(uid = caller_uid, error = %e, "Caller lookup failed");
                return Err(Error::UnknownCaller(caller_uid));
            }
        };

        debug!(
            recipient = %account.name,
            uid = account.uid,
            caller = %caller.name,
            command = %invocation.command,
            "Recipient is eligible"
        );

        Ok(Self {
            config,
            command: invocation.command,
            recipient: RecipientIdentity {
                name: account.name,
                uid: account.uid,
                gid: account.gid,
                home: account.home,
                shell: account.shell,
            },
            caller: CallerIdentity { name: caller.name },
        })
    }

    pub fn recipient(&self) -> &RecipientIdentity {
        &self.recipient
    }

    /// Make sure the system mailbox exists as a regular file owned by the
    /// recipient and readable/writable by the owner only.
    ///
    /// A missing mailbox is created and given to the recipient and the mail
    /// group. An existing mailbox is never modified.
    pub fn normalize_mailbox(&self) -> Result<NormalizedMailbox> {
        let delivery = &self.config.delivery;
        let path = delivery.mailbox_path(&self.recipient.name);

        match std::fs::symlink_metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                create_mailbox(&path, self.recipient.uid, delivery.mail_gid)?;
            }
            Err(e) => {
                warn!(mailbox = %path.display(), error = %e, "Could not stat mailbox");
                return Err(Error::UnsafeMailbox(path));
            }
        }

        let meta = std::fs::symlink_metadata(&path).map_err(|_| Error::UnsafeMailbox(path.clone()))?;
        if !meta.file_type().is_file()
            || meta.uid() != self.recipient.uid
            || meta.mode() & MAILBOX_MODE_MASK != MAILBOX_MODE
        {
            return Err(Error::UnsafeMailbox(path));
        }

        Ok(NormalizedMailbox { path })
    }

    /// Permanently become the recipient
    pub fn drop_privileges(
        self,
        mailbox: NormalizedMailbox,
        switch: &dyn IdentitySwitch,
    ) -> Result<RecipientSession> {
        let mail_gid = self.config.delivery.mail_gid;
        switch.assume(self.recipient.uid, self.recipient.gid, mail_gid)?;
        let lock_group = Arc::new(MailGroup::new(mail_gid, self.recipient.gid));

        info!(recipient = %self.recipient.name, uid = self.recipient.uid, "Running as recipient");

        Ok(RecipientSession {
            config: self.config,
            command: self.command,
            recipient: self.recipient,
            lock_group,
            caller: self.caller,
            mailbox: mailbox.path,
        })
    }
}

fn create_mailbox(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let create_failed = |source| Error::MailboxCreate {
        path: path.to_path_buf(),
        source,
    };

    let file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(MAILBOX_MODE)
        .open(path)
    {
        Ok(file) => file,
        // Lost a race with a concurrent delivery; the checks that follow apply.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
        Err(e) => return Err(create_failed(e)),
    };

    std::os::unix::fs::fchown(&file, Some(uid), Some(gid)).map_err(create_failed)?;
    file.set_permissions(std::fs::Permissions::from_mode(MAILBOX_MODE))
        .map_err(create_failed)?;

    info!(mailbox = %path.display(), uid, gid, "Created mailbox");
    Ok(())
}

/// Session running as the recipient, after the privilege drop
#[derive(Debug)]
pub struct RecipientSession {
    config: Arc<Config>,
    command: Command,
    recipient: RecipientIdentity,
    caller: CallerIdentity,
    mailbox: PathBuf,
    lock_group: Arc<dyn LockGroup>,
}

impl RecipientSession {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn recipient(&self) -> &RecipientIdentity {
        &self.recipient
    }

    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// The recipient's normalized system mailbox
    pub fn mailbox(&self) -> &Path {
        &self.mailbox
    }

    /// Writer for the system mailbox; its lock file is made with the mail
    /// group effective
    pub fn mailbox_writer(&self) -> MailboxWriter {
        MailboxWriter::new(self.config.lock.clone()).with_lock_group(self.lock_group.clone())
    }

    /// Location of the recipient's forward file
    pub fn forward_path(&self) -> PathBuf {
        self.recipient.home.join(&self.config.delivery.forward_file)
    }
}
