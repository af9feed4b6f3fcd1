//! Test fixtures: a throwaway mail directory and home, with accounts mapped
//! onto the uid/gid of the test process.

use crate::privilege::{
    AccountDirectory, AccountRecord, IdentitySwitch, PrivilegedSession, RecipientSession,
};
use mailgate_common::config::{Config, LockConfig};
use mailgate_common::{Command, Error, Invocation, Result};
use std::cell::Cell;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) struct StaticAccounts {
    records: Vec<AccountRecord>,
}

impl StaticAccounts {
    pub(crate) fn new(records: Vec<AccountRecord>) -> Self {
        Self { records }
    }
}

impl AccountDirectory for StaticAccounts {
    fn by_name(&self, name: &str) -> Result<Option<AccountRecord>> {
        Ok(self.records.iter().find(|r| r.name == name).cloned())
    }

    fn by_uid(&self, uid: u32) -> Result<Option<AccountRecord>> {
        Ok(self.records.iter().find(|r| r.uid == uid).cloned())
    }
}

#[derive(Default)]
pub(crate) struct NoopSwitch {
    assumed: Cell<Option<(u32, u32, u32)>>,
}

impl NoopSwitch {
    pub(crate) fn assumed(&self) -> Option<(u32, u32, u32)> {
        self.assumed.get()
    }
}

impl IdentitySwitch for NoopSwitch {
    fn assume(&self, uid: u32, gid: u32, lock_gid: u32) -> Result<()> {
        self.assumed.set(Some((uid, gid, lock_gid)));
        Ok(())
    }
}

pub(crate) struct FailingSwitch;

impl IdentitySwitch for FailingSwitch {
    fn assume(&self, uid: u32, _gid: u32, _lock_gid: u32) -> Result<()> {
        Err(Error::PrivilegeDropFailed(format!(
            "setresuid({}) failed: EPERM",
            uid
        )))
    }
}

pub(crate) struct Fixture {
    pub(crate) root: TempDir,
    pub(crate) config: Arc<Config>,
    pub(crate) home: PathBuf,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_min_uid(0)
    }

    pub(crate) fn with_min_uid(min_uid: u32) -> Self {
        let root = TempDir::new().unwrap();
        let mail_dir = root.path().join("mail");
        let home = root.path().join("home");
        let spool_dir = root.path().join("spool");
        for dir in [&mail_dir, &home, &spool_dir] {
            std::fs::create_dir(dir).unwrap();
        }
        let shells_file = root.path().join("shells");
        std::fs::write(&shells_file, "/bin/sh\n/bin/bash\n").unwrap();

        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();

        let mut config = Config::default();
        config.delivery.mail_dir = mail_dir;
        config.delivery.mail_gid = gid;
        config.delivery.min_uid = min_uid;
        config.delivery.shells_file = shells_file;
        config.delivery.spool_dir = spool_dir;
        config.helpers.system_dir = root.path().join("etc");
        config.lock = LockConfig {
            retries: 3,
            backoff_step_ms: 5,
            max_backoff_ms: 20,
            stale_after_secs: 300,
        };

        Self {
            root,
            config: Arc::new(config),
            home,
            uid,
            gid,
        }
    }

    pub(crate) fn alice(&self) -> AccountRecord {
        AccountRecord {
            name: "alice".to_string(),
            uid: self.uid,
            gid: self.gid,
            home: self.home.clone(),
            shell: PathBuf::from("/bin/sh"),
        }
    }

    pub(crate) fn mta(&self) -> AccountRecord {
        AccountRecord {
            name: "mta".to_string(),
            uid: self.caller_uid(),
            gid: self.gid,
            home: PathBuf::from("/var/spool/mta"),
            shell: PathBuf::from("/bin/sh"),
        }
    }

    pub(crate) fn caller_uid(&self) -> u32 {
        self.uid.wrapping_add(100_000)
    }

    pub(crate) fn accounts(&self) -> StaticAccounts {
        StaticAccounts::new(vec![self.alice(), self.mta()])
    }

    pub(crate) fn mailbox(&self) -> PathBuf {
        self.config.delivery.mail_dir.join("alice")
    }

    pub(crate) fn privileged(&self, command: Command) -> PrivilegedSession {
        let invocation = Invocation {
            command,
            recipient: "alice".to_string(),
        };
        PrivilegedSession::open(
            self.config.clone(),
            invocation,
            &self.accounts(),
            self.caller_uid(),
        )
        .unwrap()
    }

    /// Run the whole gate and hand back the recipient session
    pub(crate) fn session(&self, command: Command) -> RecipientSession {
        let session = self.privileged(command);
        let mailbox = session.normalize_mailbox().unwrap();
        session.drop_privileges(mailbox, &NoopSwitch::default()).unwrap()
    }

    pub(crate) fn write_forward(&self, content: &str) {
        std::fs::write(self.home.join(".forward"), content).unwrap();
    }

    /// Install an executable helper in the per-recipient override directory
    pub(crate) fn user_helper(&self, name: &str, script: &str) -> PathBuf {
        let dir = self.home.join(&self.config.helpers.user_dir);
        install_script(&dir, name, script)
    }

    /// Install an executable helper in the system directory
    pub(crate) fn system_helper(&self, name: &str, script: &str) -> PathBuf {
        install_script(&self.config.helpers.system_dir, name, script)
    }

    pub(crate) fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

fn install_script(dir: &Path, name: &str, script: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
