//! Outpost server and client runner.
//!
//! # Usage
//!
//! ```bash
//! # Dedicated server on the default port, resuming the default save if present
//! cargo run -p outpost_server -- serve --load savegame.json
//!
//! # Follow a game headlessly
//! cargo run -p outpost_server -- join 192.168.1.20:5555 --name Scout
//! ```
//!
//! Logging honours `RUST_LOG`; `-v` raises the default level to debug.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use outpost_core::player::PlayerProfile;
use outpost_core::world::World;
use outpost_server::config::DEFAULT_PORT;
use outpost_server::persistence;
use outpost_server::session::{HostSession, ReplicaSession};
use outpost_server::ServerConfig;

#[derive(Parser)]
#[command(name = "outpost-server")]
#[command(about = "Authoritative server and replica client for Outpost")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// RON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dedicated authoritative server
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Maximum players, host slot included
        #[arg(long)]
        max_players: Option<usize>,

        /// World seed for a new game
        #[arg(long)]
        seed: Option<u64>,

        /// Where to save on shutdown
        #[arg(long)]
        save: Option<PathBuf>,

        /// Resume from a save file, falling back to a new world
        #[arg(long)]
        load: Option<PathBuf>,
    },

    /// Connect to a server and follow the game
    Join {
        /// Server address
        #[arg(default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
        addr: String,

        /// Player name
        #[arg(short, long, default_value = "Player")]
        name: String,

        /// Palette index
        #[arg(long, default_value = "1")]
        color: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load config");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    let result = match cli.command {
        Commands::Serve {
            bind,
            port,
            max_players,
            seed,
            save,
            load,
        } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(max_players) = max_players {
                config.max_players = max_players;
            }
            if let Some(seed) = seed {
                config.world.seed = seed;
            }
            if let Some(save) = save {
                config.save_path = save;
            }
            serve(config, load).await
        }
        Commands::Join { addr, name, color } => {
            let profile = PlayerProfile {
                name,
                color_index: color,
            };
            join(config, &addr, &profile).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: ServerConfig, load: Option<PathBuf>) -> outpost_server::Result<()> {
    config.validate()?;
    let host = PlayerProfile {
        name: "Host".to_string(),
        color_index: 0,
    };
    let world = match load {
        Some(path) => persistence::load_or_generate(&path, config.world.clone(), &host),
        None => World::generate(config.world.clone(), &host),
    };

    info!("Starting Outpost dedicated server");
    let session = HostSession::start(config, world, None).await?;
    session.run(shutdown_signal()).await
}

async fn join(config: ServerConfig, addr: &str, profile: &PlayerProfile) -> outpost_server::Result<()> {
    let mut session = ReplicaSession::connect(&config, addr, profile).await?;
    session.wait_until_joined(config.connect_timeout()).await?;
    info!(player = ?session.player_id(), "Following game, Ctrl-C to leave");
    session.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
