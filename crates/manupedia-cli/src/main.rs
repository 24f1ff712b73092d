//! Manupedia CLI - log in to a Manupedia backend and inspect the session.
//!
//! The session is persisted between runs, so `manupedia login` followed by
//! `manupedia profile` reuses the stored bearer token.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use manupedia_core::access::visible_quick_access;
use manupedia_core::{ApiClient, AuthorizedClient, Config, SessionManager};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name inside the data directory
const LOG_FILE: &str = "manupedia.log";

/// Password source for non-interactive use
const ENV_PASSWORD: &str = "MANUPEDIA_PASSWORD";

const USAGE: &str = "\
Usage: manupedia <command> [options]

Commands:
  login   [--email EMAIL]                          Log in (prompts for password)
  signup  --name NAME --email EMAIL [--phone PHONE] Create an account and log in
  logout                                           Forget the stored session
  whoami                                           Show the logged-in identity
  status                                           Show session and gated features
  profile                                          Fetch the profile from the backend
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { email: Option<String> },
    Signup { name: String, email: String, phone: String },
    Logout,
    Whoami,
    Status,
    Profile,
    Help,
}

/// Value following `flag`, e.g. `--email a@x.com`.
fn flag_value(args: &[String], flag: &str) -> Result<Option<String>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .filter(|v| !v.starts_with("--"))
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow!("{} requires a value", flag)),
        None => Ok(None),
    }
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };
    let rest = &args[1..];

    Ok(match command.as_str() {
        "login" => Command::Login {
            email: flag_value(rest, "--email")?,
        },
        "signup" => Command::Signup {
            name: flag_value(rest, "--name")?.ok_or_else(|| anyhow!("signup requires --name"))?,
            email: flag_value(rest, "--email")?
                .ok_or_else(|| anyhow!("signup requires --email"))?,
            phone: flag_value(rest, "--phone")?.unwrap_or_default(),
        },
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "status" => Command::Status,
        "profile" => Command::Profile,
        "help" | "--help" | "-h" => Command::Help,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    })
}

/// Initialize the tracing subscriber: stderr honours RUST_LOG (default
/// `warn`), the log file in the data directory records `info` and above.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    Ok(rpassword::prompt_password("Password: ")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    if command == Command::Help {
        print!("{}", USAGE);
        return Ok(());
    }

    let (mut config, config_error) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let data_dir = Config::data_dir().ok();
    let _log_guard = init_tracing(data_dir.as_deref());
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(api = %config.api_base_url, storage = ?config.storage, "Manupedia CLI starting");

    let api = ApiClient::with_timeout(&config.api_base_url, config.request_timeout())?;
    let session = Arc::new(SessionManager::new(
        Arc::new(api.clone()),
        config.session_store()?,
    ));
    session.initialize();

    match command {
        Command::Login { email } => {
            let email = match email.or_else(|| config.last_email.clone()) {
                Some(email) => email,
                None => prompt_line("Email: ")?,
            };
            if email.is_empty() {
                bail!("Email is required");
            }
            let password = read_password()?;

            let identity = session
                .login(&email, &password)
                .await
                .map_err(|e| anyhow!(e.message().to_string()))?;

            config.last_email = Some(identity.email.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!(
                "Logged in as {} <{}> ({})",
                identity.display_name, identity.email, identity.role
            );
        }
        Command::Signup { name, email, phone } => {
            let password = read_password()?;
            let identity = session
                .signup(&name, &email, &password, &phone)
                .await
                .map_err(|e| anyhow!(e.message().to_string()))?;

            config.last_email = Some(identity.email.clone());
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Welcome, {}! Your account has been created.", identity.display_name);
        }
        Command::Logout => {
            session.logout();
            println!("Logged out.");
        }
        Command::Whoami => match session.identity() {
            Some(identity) => println!(
                "{} <{}> id={} role={}",
                identity.display_name, identity.email, identity.id, identity.role
            ),
            None => println!("Not logged in."),
        },
        Command::Status => {
            let snapshot = session.snapshot();
            println!("Backend:        {}", config.api_base_url);
            println!("Authenticated:  {}", session.is_authenticated());
            println!("Admin:          {}", session.is_admin());
            println!("Quick access:");
            for item in visible_quick_access(snapshot.as_ref()) {
                println!("  - {}", item.label);
            }
        }
        Command::Profile => {
            if !session.is_authenticated() {
                bail!("Not logged in. Run `manupedia login` first.");
            }
            let client = AuthorizedClient::new(api, session.clone());
            match client.current_user().await {
                Ok(profile) => println!(
                    "{} <{}> id={} role={}",
                    profile.display_name, profile.email, profile.id, profile.role
                ),
                Err(e) if !session.is_authenticated() => {
                    warn!(error = %e, "Profile request rejected");
                    bail!("Session expired. Please log in again.");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Help => print!("{}", USAGE),
    }

    Ok(())
}
