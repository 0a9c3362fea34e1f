//! tiko-todos - a command-line client for the tiko todo service.
//!
//! Logs in once, keeps the token pair in the OS keychain, and renews the
//! access token transparently on later runs.

mod commands;
mod format;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use tiko_todos_core::AuthError;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Command, Context};

const USAGE: &str = "\
Usage: tiko-todos [--ephemeral] <command> [args]

Commands:
  login [email]              Log in and store the session in the keychain
  register                   Create an account
  logout                     Forget the stored session
  status                     Show the current session state
  list [--json]              List todos
  add <description...>       Create a todo
  edit <id> <description...> Change the description of a todo
  done <id>                  Mark a todo as done
  undone <id>                Mark a todo as not done
  delete <id>                Delete a todo

Options:
  --ephemeral                Keep tokens in memory for this run only

Environment:
  TIKO_API_URL        API base URL (default: hosted service)
  TIKO_TIMEOUT_SECS   Request timeout in seconds
  RUST_LOG            Log filter, e.g. RUST_LOG=debug";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let ephemeral = commands::take_flag(&mut args, commands::EPHEMERAL_FLAG);
    let command = match Command::parse(&args) {
        Ok(Some(command)) => command,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };
    debug!(?command, "Parsed command");

    match run(command, ephemeral).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, ephemeral: bool) -> Result<()> {
    let ctx = Context::init(ephemeral).await?;
    info!(base_url = ctx.session.api().base_url(), "tiko-todos starting");
    commands::execute(&ctx, command).await
}

/// Print an error with a hint for the errors a user can act on
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<AuthError>() {
        Some(AuthError::SessionExpired) => {
            eprintln!("Session expired. Please log in again with `tiko-todos login`.");
        }
        Some(AuthError::Unauthenticated) => {
            eprintln!("Not logged in. Run `tiko-todos login` first.");
        }
        Some(AuthError::InvalidCredentials) => {
            eprintln!("Invalid email or password.");
        }
        Some(AuthError::Network(_)) => {
            eprintln!("Unable to connect to server. Check your internet connection.");
            eprintln!("Details: {:#}", err);
        }
        _ => eprintln!("Error: {:#}", err),
    }
}
