// bangcatalog - dump a catalog session's playlist tree
// Runs against the simulated catalog so the whole load path can be watched end to end

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use bangcatalog::config::Config;
use bangcatalog::logging::init_logging;
use bangcatalog::provider::{CatalogFixture, ProviderError, SessionCallback, SimulatedProvider};
use bangcatalog::session::{drive_until, Session, SessionConfig, SessionEvent};

#[derive(Parser)]
#[command(name = "bangcatalog")]
#[command(about = "Load a music catalog's playlist container and print it")]
struct Args {
    /// Enable developer logging (stderr + debug output)
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, wait until every playlist and track has loaded, print the tree
    Dump {
        /// Catalog fixture (TOML) served by the simulated provider
        #[arg(long)]
        catalog: PathBuf,
        /// Print a JSON snapshot instead of the indented text tree
        #[arg(long)]
        json: bool,
        /// Also print the starred playlist
        #[arg(long)]
        starred: bool,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Write the default config file
    InitConfig {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::InitConfig { force } => init_config(force),
        Command::Dump {
            catalog,
            json,
            starred,
            timeout_ms,
            username,
            password,
        } => {
            let config = Config::load()?;
            init_logging(&config.logging, args.dev)?;
            info!(catalog = %catalog.display(), "bangcatalog starting up");

            let fixture = CatalogFixture::load(&catalog)?;
            let account = fixture.account.clone();
            let username = username
                .or_else(|| account.as_ref().map(|a| a.username.clone()))
                .unwrap_or_else(|| "guest".to_string());
            let password = password
                .or_else(|| account.map(|a| a.password))
                .unwrap_or_default();

            let session_config = config.session.to_session_config().unwrap_or_else(|err| {
                warn!(error = %err, "no application key; the simulated catalog accepts any");
                SessionConfig {
                    application_key: b"simulated".to_vec(),
                    ..SessionConfig::default()
                }
            });
            let mut session = Session::initialize(session_config, |_, signal| {
                Ok(SimulatedProvider::new(fixture, signal))
            })?;

            let limit = Duration::from_millis(timeout_ms);
            let max_delay = config.driver.max_pump_delay();
            let result = timeout(
                limit,
                dump(&mut session, &username, &password, json, starred, max_delay),
            )
            .await
            .context("timed out waiting for the catalog to load");
            session.shutdown();
            result?
        }
    }
}

fn init_config(force: bool) -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    Config::default().save_to(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn dump(
    session: &mut Session,
    username: &str,
    password: &str,
    json: bool,
    starred: bool,
    max_delay: Duration,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_event_sender(tx);

    session.login(username, password, false);
    let mut login_error: Option<ProviderError> = None;
    drive_until(
        session,
        |s| {
            while let Ok(event) = rx.try_recv() {
                if let SessionEvent::Callback(SessionCallback::LoggedIn(Err(err))) = event {
                    login_error = Some(err);
                }
            }
            s.is_logged_in() || login_error.is_some()
        },
        max_delay,
    )
    .await?;
    if let Some(err) = login_error {
        return Err(err).context("login failed");
    }

    let container = session
        .playlist_container()
        .context("provider has no playlist container")?;
    let pumps = drive_until(session, |_| !container.is_loading(true), max_delay).await?;
    info!(pumps, "container fully loaded");

    if let Some(err) = container.decode_error() {
        warn!(error = %err, "container hierarchy could not be decoded");
        eprintln!("warning: {err}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&container.snapshot())?);
    } else {
        print!("{}", container.dump());
    }

    if starred {
        let list = session
            .starred_playlist()
            .context("provider has no starred playlist")?;
        drive_until(session, |_| !list.is_loading(true), max_delay).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&list.snapshot())?);
        } else {
            print!("{}", list.dump());
        }
    }
    Ok(())
}
