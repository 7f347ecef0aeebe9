//! DentalNow CLI - command-line access to the clinic booking API.
//!
//! Signs in, keeps the session on disk (or in the OS keychain), and issues
//! API calls through the same renewing client the application screens use.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dentalnow_core::{
    endpoints, ApiClient, ChannelObserver, Config, CredentialStore, FileStorage, KeyringStorage,
    SessionEvent,
};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: dentalnow <command> [args]

Commands:
  login [username]        Sign in (password from DENTALNOW_PASSWORD or prompt)
  logout                  Forget the stored session
  whoami                  Show the signed-in user
  clinics [query]         List clinics, or search them
  clinic <id>             Show one clinic with its doctors and services
  appointments            List your appointments
  cancel <appointment-id> Cancel an appointment
  get <path>              GET any API path
  delete <path>           DELETE any API path
  post <path> <json>      POST a JSON body
  put <path> <json>       PUT a JSON body

Environment:
  DENTALNOW_API_URL, DENTALNOW_TIMEOUT_SECS, DENTALNOW_SESSION_DIR,
  DENTALNOW_SESSION_STORE=keyring, DENTALNOW_LOG_FILE, RUST_LOG";

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr unless DENTALNOW_LOG_FILE names a file.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var("DENTALNOW_LOG_FILE") {
        Ok(file) if !file.is_empty() => {
            let file = PathBuf::from(file);
            let dir = file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = file
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "dentalnow.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn open_store(config: &Config) -> Result<CredentialStore> {
    let store = match std::env::var("DENTALNOW_SESSION_STORE").as_deref() {
        Ok("keyring") => CredentialStore::open(KeyringStorage::new("default")),
        _ => CredentialStore::open(FileStorage::new(config.session_dir()?)),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    info!(api = %config.api_base_url, "DentalNow CLI starting");

    let store = open_store(&config)?;
    let (observer, mut events) = ChannelObserver::new();
    let client = ApiClient::new(&config, store, Arc::new(observer))
        .context("Failed to create API client")?;

    let result = run(&client, command, &args[1..]).await;
    let expired = report_session_events(&mut events);

    match result {
        Ok(()) => Ok(()),
        Err(e) if expired => {
            eprintln!("Error: {}", e);
            eprintln!("Your session has ended. Run `dentalnow login` to sign in again.");
            // exit() skips destructors; flush the log file first
            drop(log_guard);
            std::process::exit(2);
        }
        Err(e) => Err(e),
    }
}

/// Print lifecycle events; returns true if the session was torn down.
fn report_session_events(events: &mut UnboundedReceiver<SessionEvent>) -> bool {
    let mut expired = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Renewed => info!("Session renewed"),
            SessionEvent::Expired { reason } => {
                info!(reason = %reason, "Session expired");
                expired = true;
            }
            SessionEvent::LoggedIn | SessionEvent::LoggedOut => {}
        }
    }
    expired
}

async fn run(client: &ApiClient, command: &str, args: &[String]) -> Result<()> {
    match command {
        "login" => login(client, args.first().cloned()).await,
        "logout" => {
            client.logout();
            println!("Signed out.");
            Ok(())
        }
        "whoami" => {
            let me: Value = client.get(endpoints::AUTH_ME).await?;
            print_json(&me)
        }
        "clinics" => {
            let clinics: Value = match args.first() {
                Some(query) => {
                    client
                        .get_with_query(endpoints::SEARCH_CLINICS, &serde_json::json!({ "q": query }))
                        .await?
                }
                None => client.get(endpoints::CLINICS).await?,
            };
            print_json(&clinics)
        }
        "clinic" => {
            let id = required(args, 0, "clinic id")?;
            let (detail_path, doctors_path, services_path) = (
                endpoints::clinic_detail(id),
                endpoints::clinic_doctors(id),
                endpoints::clinic_services(id),
            );
            // Fired together, like the clinic page does; one renewal serves all three.
            let (clinic, doctors, services) = tokio::try_join!(
                client.get::<Value>(&detail_path),
                client.get::<Value>(&doctors_path),
                client.get::<Value>(&services_path),
            )?;
            print_json(&serde_json::json!({
                "clinic": clinic,
                "doctors": doctors,
                "services": services,
            }))
        }
        "appointments" => {
            let appointments: Value = client.get(endpoints::APPOINTMENTS).await?;
            print_json(&appointments)
        }
        "cancel" => {
            let id = required(args, 0, "appointment id")?;
            let result: Value = client
                .post(&endpoints::cancel_appointment(id), &serde_json::json!({}))
                .await?;
            print_json(&result)
        }
        "get" => {
            let body: Value = client.get(required(args, 0, "path")?).await?;
            print_json(&body)
        }
        "delete" => {
            let body: Value = client.delete(required(args, 0, "path")?).await?;
            print_json(&body)
        }
        "post" | "put" => {
            let path = required(args, 0, "path")?;
            let raw = required(args, 1, "JSON body")?;
            let payload: Value = serde_json::from_str(raw).context("Body is not valid JSON")?;
            let body: Value = if command == "post" {
                client.post(path, &payload).await?
            } else {
                client.put(path, &payload).await?
            };
            print_json(&body)
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

async fn login(client: &ApiClient, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| std::env::var("DENTALNOW_USERNAME").ok()) {
        Some(u) if !u.is_empty() => u,
        _ => bail!("Usage: dentalnow login <username>"),
    };
    let password = match std::env::var("DENTALNOW_PASSWORD") {
        Ok(p) if !p.is_empty() => p,
        _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let user = client.login(&username, &password).await?;
    println!("Signed in as {}.", user.display_name());
    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing {}", what))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
