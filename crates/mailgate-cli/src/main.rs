//! mailgate - Local delivery agent entry point
//!
//! Invoked by the MTA as `mailgate <command> <recipient>` with the message on
//! standard input. Standard output is reserved for names handed back to the
//! MTA; logs go to standard error.

use mailgate_common::config::{Config, LoggingConfig};
use mailgate_common::{Invocation, Result};
use mailgate_core::{Delivery, PrivilegedSession, SystemAccounts, SystemSwitch};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    let config = Config::load();

    // Logging comes up even when the config is broken, so the failure is seen
    match &config {
        Ok(config) => init_logging(&config.logging),
        Err(_) => init_logging(&LoggingConfig::default()),
    }

    match config.and_then(run) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(code = e.code(), error = %e, "Delivery failed");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(config: Config) -> Result<u8> {
    let invocation = Invocation::from_args(
        std::env::args_os()
            .skip(1)
            .map(|arg| arg.to_string_lossy().into_owned()),
    )?;
    info!(command = %invocation.command, recipient = %invocation.recipient, "Starting delivery");

    let caller_uid = nix::unistd::getuid().as_raw();
    let session = PrivilegedSession::open(Arc::new(config), invocation, &SystemAccounts, caller_uid)?;
    let mailbox = session.normalize_mailbox()?;
    let session = session.drop_privileges(mailbox, &SystemSwitch)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("could not start runtime: {}", e))?;

    let outcome = runtime.block_on(async {
        let mut stdin = tokio::io::stdin();
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        Delivery::new(&session).run(&mut stdin, &mut out).await
    })?;

    info!(outcome = ?outcome, "Delivery finished");
    Ok(outcome.exit_code())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    }
}
