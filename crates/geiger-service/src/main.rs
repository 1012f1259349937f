//! Geiger Service - Ingest endpoint, query API and dashboard.
//!
//! Run with: `cargo run -p geiger-service`

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use geiger_service::config::default_config_path;
use geiger_service::{AppState, Config};
use geiger_store::Store;

/// Geiger Service - Ingest endpoint, query API and dashboard.
#[derive(Parser, Debug)]
#[command(name = "geiger-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "GEIGER_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true, env = "GEIGER_BIND")]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true, env = "GEIGER_DATABASE")]
    database: Option<PathBuf>,

    /// Hostname allowed to upload besides loopback (overrides config).
    #[arg(long, global = true, env = "HOME_HOSTNAME")]
    trusted_host: Option<String>,

    /// Relay every accepted reading to the public map (overrides config).
    ///
    /// Any value of `FORWARD_TO_GMC` other than empty, `0`, `false`, `no`,
    /// `n` or `off` enables it.
    #[arg(
        long,
        global = true,
        env = "FORWARD_TO_GMC",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    forward_to_gmc: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::InitConfig { force }) => init_config(args.config, force),
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("geiger_service=info".parse()?)
                .add_directive("geiger_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args and environment
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(host) = args.trusted_host {
        config.server.trusted_host = Some(host);
    }
    if args.forward_to_gmc {
        config.relay.enabled = true;
    }

    config.validate()?;

    let store = Store::open(&config.storage.path)
        .with_context(|| format!("opening database {}", config.storage.path.display()))?;
    info!(
        "Database holds {} readings (cap {})",
        store.count_readings()?,
        config.retention.cap
    );

    match &config.server.trusted_host {
        Some(host) => info!("Accepting uploads from loopback and {}", host),
        None => info!("Accepting uploads from loopback only"),
    }

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config);
    if let Some(relay) = &state.relay {
        info!("Relaying readings to {}", relay.url());
    }

    let app = geiger_service::app(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
