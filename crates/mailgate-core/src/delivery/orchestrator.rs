//! Delivery orchestrator

use crate::forward::{forward_file, ForwardInterpreter, InterpretReport};
use crate::privilege::RecipientSession;
use crate::process::{HelperResolver, Launcher, WaitStatus, SEND_QUEUE};
use mailgate_common::{Command, Error, Result};
use mailgate_storage::SpooledMessage;
use std::io::Write;
use tokio::io::AsyncRead;
use tracing::{info, warn};

/// Exit code when `send-queue` is missing or did not exit normally
const SEND_QUEUE_UNAVAILABLE: u8 = 55;
/// Exit code for a command word that is not recognised
const UNKNOWN_COMMAND: u8 = 66;

/// How a delivery ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Appended to the system mailbox, no forward file
    Delivered,
    /// Forward file interpreted
    Interpreted(InterpretReport),
    /// Handed to `send-queue`
    Sent(WaitStatus),
    /// Command word not recognised
    UnknownCommand,
}

impl Outcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Delivered | Outcome::Interpreted(_) => 0,
            Outcome::Sent(status) => match status.exit_code() {
                Some(code) => (code & 0xff) as u8,
                None => SEND_QUEUE_UNAVAILABLE,
            },
            Outcome::UnknownCommand => UNKNOWN_COMMAND,
        }
    }
}

/// One delivery for a recipient session
pub struct Delivery<'s> {
    session: &'s RecipientSession,
}

impl<'s> Delivery<'s> {
    pub fn new(session: &'s RecipientSession) -> Self {
        Self { session }
    }

    /// Read the message from `input` and deliver it, writing anything meant
    /// for the MTA to `out`
    pub async fn run<R, W>(&self, input: &mut R, out: &mut W) -> Result<Outcome>
    where
        R: AsyncRead + Unpin,
        W: Write,
    {
        let session = self.session;
        if let Command::Unknown(word) = session.command() {
            warn!(command = %word, "Unknown command");
            writeln!(out, "Unknown command")
                .and_then(|_| out.flush())
                .map_err(|e| anyhow::anyhow!("writing to standard output failed: {}", e))?;
            return Ok(Outcome::UnknownCommand);
        }

        let config = session.config();
        let message = SpooledMessage::spool(
            input,
            &config.delivery.spool_dir,
            config.limits.max_message_size,
        )
        .await?;
        info!(
            command = %session.command(),
            recipient = %session.recipient().name,
            size = message.len(),
            "Message received"
        );

        if *session.command() == Command::Send {
            return self.send(&message).await;
        }

        match forward_file(session).await {
            None => {
                session
                    .mailbox_writer()
                    .append(session.mailbox(), &message, &session.caller().name)
                    .await?;
                Ok(Outcome::Delivered)
            }
            Some(forward) => {
                let interpreter = ForwardInterpreter::new(session);
                let send_permitted = interpreter.sending_permitted(&message).await?;
                let report = interpreter
                    .run(&forward, &message, send_permitted, out)
                    .await?;
                Ok(Outcome::Interpreted(report))
            }
        }
    }

    async fn send(&self, message: &SpooledMessage) -> Result<Outcome> {
        let helper = HelperResolver::for_session(self.session)
            .find(SEND_QUEUE)
            .await
            .ok_or(Error::HelperNotFound(SEND_QUEUE))?;

        let argv = vec![helper.into_os_string()];
        let status = Launcher::for_session(self.session)
            .run(&argv, message.stdin()?)
            .await?;
        info!(status = %status, "send-queue finished");
        Ok(Outcome::Sent(status))
    }
}
