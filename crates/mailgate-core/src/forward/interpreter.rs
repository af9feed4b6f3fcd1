//! Forward file interpreter
//!
//! Rules run one at a time in file order. Every rule that consumes the
//! message gets its own rewound view of the spool. A malformed line stops
//! the interpretation; a failed mailbox write aborts the whole delivery.

use super::rule::{parse_rule, ForwardRule};
use crate::privilege::RecipientSession;
use crate::process::{HelperResolver, Launcher, CAN_SEND, QUEUE_MAIL};
use mailgate_common::{Command, Error, Result};
use mailgate_storage::{MailboxWriter, SpooledMessage};
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// What an interpretation run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpretReport {
    /// Lines read, comments included
    pub rules: usize,
    /// Addresses and aliases handed back to the MTA on standard output
    pub printed: Vec<Vec<u8>>,
    /// External addresses passed to the outbound queue
    pub queued: Vec<OsString>,
    /// Interpretation stopped at a malformed line
    pub halted: bool,
}

/// The recipient's forward file, if it exists and is owned by the recipient
/// or by root
pub async fn forward_file(session: &RecipientSession) -> Option<PathBuf> {
    let path = session.forward_path();
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.uid() == session.recipient().uid || meta.uid() == 0 => Some(path),
        Ok(meta) => {
            warn!(
                path = %path.display(),
                owner = meta.uid(),
                "Ignoring forward file with foreign owner"
            );
            None
        }
        Err(_) => None,
    }
}

/// Carries out forward rules for one recipient
pub struct ForwardInterpreter<'s> {
    session: &'s RecipientSession,
    writer: MailboxWriter,
    system: MailboxWriter,
    launcher: Launcher,
    helpers: HelperResolver,
}

impl<'s> ForwardInterpreter<'s> {
    pub fn new(session: &'s RecipientSession) -> Self {
        Self {
            session,
            writer: MailboxWriter::new(session.config().lock.clone()),
            system: session.mailbox_writer(),
            launcher: Launcher::for_session(session),
            helpers: HelperResolver::for_session(session),
        }
    }

    /// Ask `can-send` whether external addresses may be queued.
    ///
    /// Only the `forward` command can ever send outward.
    pub async fn sending_permitted(&self, message: &SpooledMessage) -> Result<bool> {
        if *self.session.command() != Command::Forward {
            return Ok(false);
        }
        let Some(helper) = self.helpers.find(CAN_SEND).await else {
            return Ok(false);
        };

        let argv = vec![helper.into_os_string()];
        let status = self.launcher.run(&argv, message.stdin()?).await?;
        debug!(status = %status, "can-send finished");
        Ok(status.success())
    }

    /// Interpret the forward file at `forward`, writing handed-back names to
    /// `out`
    pub async fn run<W: Write>(
        &self,
        forward: &Path,
        message: &SpooledMessage,
        send_permitted: bool,
        out: &mut W,
    ) -> Result<InterpretReport> {
        let forward_error = |source| Error::ForwardFile {
            path: forward.to_path_buf(),
            source,
        };

        let file = tokio::fs::File::open(forward).await.map_err(forward_error)?;
        let mut reader = BufReader::new(file);
        let mut report = InterpretReport::default();
        let mut buf = Vec::new();
        let recipient = self.session.recipient();
        let limits = &self.session.config().limits;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await.map_err(forward_error)? == 0 {
                break;
            }
            report.rules += 1;

            let rule = match parse_rule(&buf, &recipient.name, limits) {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(line = report.rules, error = %e, "Malformed forward rule, stopping");
                    report.halted = true;
                    break;
                }
            };
            debug!(line = report.rules, rule = ?rule, "Forward rule");

            match rule {
                ForwardRule::Comment => {}
                ForwardRule::Pipe(argv) => {
                    flush(out)?;
                    let status = self.launcher.run(&argv, message.stdin()?).await?;
                    if !status.success() {
                        warn!(command = ?argv, status = %status, "Pipe rule failed");
                    }
                }
                ForwardRule::Mailbox(path) => {
                    self.writer
                        .append(&path, message, &self.session.caller().name)
                        .await?;
                }
                ForwardRule::SelfMailbox => {
                    self.system
                        .append(self.session.mailbox(), message, &self.session.caller().name)
                        .await?;
                }
                ForwardRule::External(address) if send_permitted => {
                    report.queued.push(OsStr::from_bytes(&address).to_os_string());
                }
                ForwardRule::External(name) | ForwardRule::LocalAlias(name) => {
                    print_line(out, &name)?;
                    report.printed.push(name);
                }
            }
        }

        if send_permitted && !report.queued.is_empty() {
            self.queue(message, &report.queued, out).await?;
        }
        flush(out)?;

        info!(
            rules = report.rules,
            printed = report.printed.len(),
            queued = report.queued.len(),
            halted = report.halted,
            "Forward file processed"
        );
        Ok(report)
    }

    async fn queue<W: Write>(
        &self,
        message: &SpooledMessage,
        addresses: &[OsString],
        out: &mut W,
    ) -> Result<()> {
        let Some(helper) = self.helpers.find(QUEUE_MAIL).await else {
            warn!(count = addresses.len(), "No queue-mail helper, external addresses dropped");
            return Ok(());
        };

        let mut argv = Vec::with_capacity(addresses.len() + 1);
        argv.push(helper.into_os_string());
        argv.extend(addresses.iter().cloned());

        flush(out)?;
        let status = self.launcher.run(&argv, message.stdin()?).await?;
        if !status.success() {
            return Err(Error::QueueHandoffFailed(status.to_string()));
        }
        info!(count = addresses.len(), "Queued message for external addresses");
        Ok(())
    }
}

fn print_line<W: Write>(out: &mut W, line: &[u8]) -> Result<()> {
    out.write_all(line)
        .and_then(|_| out.write_all(b"\n"))
        .map_err(|e| anyhow::anyhow!("writing to standard output failed: {}", e))?;
    Ok(())
}

fn flush<W: Write>(out: &mut W) -> Result<()> {
    out.flush()
        .map_err(|e| anyhow::anyhow!("flushing standard output failed: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use pretty_assertions::assert_eq;

    const MESSAGE: &[u8] = b"Subject: forward me\n\nbody\n";

    async fn spooled(fixture: &Fixture) -> SpooledMessage {
        let mut input = MESSAGE;
        SpooledMessage::spool(&mut input, &fixture.config.delivery.spool_dir, None)
            .await
            .unwrap()
    }

    async fn interpret(
        fixture: &Fixture,
        command: Command,
        send_permitted: bool,
    ) -> (Result<InterpretReport>, String) {
        let session = fixture.session(command);
        let message = spooled(fixture).await;
        let mut out = Vec::new();
        let result = ForwardInterpreter::new(&session)
            .run(&session.forward_path(), &message, send_permitted, &mut out)
            .await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_printed_lines_are_externals_and_aliases_in_order() {
        let fixture = Fixture::new();
        fixture.write_forward(
            "# comment\n\
             bob@example.com\n\
             \n\
             postmaster\n\
             \"carol@example.org\"\n\
             \\dave\n",
        );

        let (report, out) = interpret(&fixture, Command::Forward, false).await;
        let report = report.unwrap();

        assert_eq!(out, "bob@example.com\npostmaster\ncarol@example.org\ndave\n");
        assert_eq!(report.printed.len(), 4);
        assert_eq!(report.rules, 6);
        assert!(report.queued.is_empty());
        assert!(!report.halted);
    }

    #[tokio::test]
    async fn test_rules_fan_out_in_file_order() {
        let fixture = Fixture::new();
        let extra = fixture.path("extra");
        let piped = fixture.path("piped");
        fixture.write_forward(&format!(
            "{}\n|/bin/sh -c cat>{}\nalice\n",
            extra.display(),
            piped.display()
        ));

        let (report, out) = interpret(&fixture, Command::Deliver, false).await;
        report.unwrap();

        assert_eq!(out, "");
        assert_eq!(std::fs::read(&piped).unwrap(), MESSAGE);

        for mbox in [extra, fixture.mailbox()] {
            let content = std::fs::read(&mbox).unwrap();
            assert!(content.starts_with(b"From mta "));
            assert!(content.ends_with(b"body\n\n"));
        }
    }

    #[tokio::test]
    async fn test_empty_rules_are_printed_as_empty_lines() {
        let fixture = Fixture::new();
        fixture.write_forward("\"\"\n\\\nlast\n");

        let (report, out) = interpret(&fixture, Command::Deliver, false).await;
        assert_eq!(report.unwrap().printed.len(), 3);
        assert_eq!(out, "\n\nlast\n");
    }

    #[tokio::test]
    async fn test_non_utf8_mailbox_path_is_used_as_written() {
        let fixture = Fixture::new();
        let mut rule = fixture.root.path().as_os_str().as_bytes().to_vec();
        rule.extend_from_slice(b"/caf\xe9\n\xc9mile\n");
        std::fs::write(fixture.home.join(".forward"), &rule).unwrap();

        let session = fixture.session(Command::Deliver);
        let message = spooled(&fixture).await;
        let mut out = Vec::new();
        ForwardInterpreter::new(&session)
            .run(&session.forward_path(), &message, false, &mut out)
            .await
            .unwrap();

        let intended = fixture.root.path().join(OsStr::from_bytes(b"caf\xe9"));
        let content = std::fs::read(&intended).unwrap();
        assert!(content.ends_with(b"body\n\n"));
        assert!(!fixture.root.path().join("caf\u{FFFD}").exists());
        assert_eq!(out, b"\xc9mile\n");
    }

    #[tokio::test]
    async fn test_unterminated_quote_stops_later_rules() {
        let fixture = Fixture::new();
        let later = fixture.path("later");
        fixture.write_forward(&format!(
            "first\n\"/var/mail/extra\n{}\nlast\n",
            later.display()
        ));

        let (report, out) = interpret(&fixture, Command::Forward, false).await;
        let report = report.unwrap();

        assert!(report.halted);
        assert_eq!(report.rules, 2);
        assert_eq!(out, "first\n");
        assert!(!later.exists());
    }

    #[tokio::test]
    async fn test_failed_pipe_does_not_stop_interpretation() {
        let fixture = Fixture::new();
        fixture.write_forward("|/bin/false\n|/no/such/program\nnext\n");

        let (report, out) = interpret(&fixture, Command::Forward, false).await;
        report.unwrap();
        assert_eq!(out, "next\n");
    }

    #[tokio::test]
    async fn test_mailbox_failure_aborts() {
        let fixture = Fixture::new();
        let dir = fixture.path("a-directory");
        std::fs::create_dir(&dir).unwrap();
        fixture.write_forward(&format!("{}\nafter\n", dir.display()));

        let (report, out) = interpret(&fixture, Command::Forward, false).await;
        assert!(matches!(report, Err(Error::OpenFailed { .. })));
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_permitted_externals_go_to_queue_mail() {
        let fixture = Fixture::new();
        let args = fixture.path("queue-args");
        let body = fixture.path("queue-body");
        fixture.system_helper(
            QUEUE_MAIL,
            &format!(
                "#!/bin/sh\necho \"$@\" > {}\ncat > {}\n",
                args.display(),
                body.display()
            ),
        );
        fixture.write_forward("bob@example.com\nlocal\ncarol@example.org\n");

        let (report, out) = interpret(&fixture, Command::Forward, true).await;
        let report = report.unwrap();

        assert_eq!(out, "local\n");
        assert_eq!(
            report.queued,
            vec![
                OsString::from("bob@example.com"),
                OsString::from("carol@example.org"),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(&args).unwrap(),
            "bob@example.com carol@example.org\n"
        );
        assert_eq!(std::fs::read(&body).unwrap(), MESSAGE);
    }

    #[tokio::test]
    async fn test_queue_mail_failure_is_fatal() {
        let fixture = Fixture::new();
        fixture.user_helper(QUEUE_MAIL, "#!/bin/sh\nexit 75\n");
        fixture.write_forward("bob@example.com\n");

        let (report, _) = interpret(&fixture, Command::Forward, true).await;
        let err = report.unwrap_err();
        assert!(matches!(err, Error::QueueHandoffFailed(_)));
        assert_eq!(err.exit_code(), 66);
    }

    #[tokio::test]
    async fn test_missing_queue_mail_is_not_fatal() {
        let fixture = Fixture::new();
        fixture.write_forward("bob@example.com\n");

        let (report, out) = interpret(&fixture, Command::Forward, true).await;
        assert_eq!(report.unwrap().queued, vec![OsString::from("bob@example.com")]);
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_sending_permission() {
        let fixture = Fixture::new();
        let message = spooled(&fixture).await;

        let forward = fixture.session(Command::Forward);
        let deliver = fixture.session(Command::Deliver);
        assert!(!ForwardInterpreter::new(&forward)
            .sending_permitted(&message)
            .await
            .unwrap());

        let seen = fixture.path("can-send-input");
        fixture.user_helper(
            CAN_SEND,
            &format!("#!/bin/sh\ncat > {}\nexit 0\n", seen.display()),
        );
        assert!(ForwardInterpreter::new(&forward)
            .sending_permitted(&message)
            .await
            .unwrap());
        assert_eq!(std::fs::read(&seen).unwrap(), MESSAGE);
        assert!(!ForwardInterpreter::new(&deliver)
            .sending_permitted(&message)
            .await
            .unwrap());

        fixture.user_helper(CAN_SEND, "#!/bin/sh\nexit 1\n");
        assert!(!ForwardInterpreter::new(&forward)
            .sending_permitted(&message)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_forward_file_ownership() {
        let fixture = Fixture::new();
        let session = fixture.session(Command::Deliver);
        assert_eq!(forward_file(&session).await, None);

        fixture.write_forward("bob@example.com\n");
        assert_eq!(forward_file(&session).await, Some(session.forward_path()));
    }
}
