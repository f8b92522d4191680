//! Tripboard Store CLI
//!
//! ## Usage
//!
//! ```bash
//! # Create the storage directory, config file and schema
//! tripboard-store init
//!
//! # Row counts per table
//! tripboard-store stats
//!
//! # Register a user
//! tripboard-store create-user --username ana --email ana@example.com
//!
//! # Custom storage directory
//! tripboard-store --storage-dir /data/trips stats
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tripboard_store::db::users::CreateUserInput;
use tripboard_store::{Config, Database, Services};

#[derive(Parser, Debug)]
#[command(name = "tripboard-store")]
#[command(about = "Storage core for trip-planning kanban boards")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "TRIPBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "TRIPBOARD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Currency for boards created without one
    #[arg(long, env = "TRIPBOARD_DEFAULT_CURRENCY")]
    default_currency: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the storage directory, config and schema
    Init,

    /// Print row counts as JSON
    Stats,

    /// Register a user
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        last_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tripboard_store=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => Config::default(),
    };

    // CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(currency) = args.default_currency {
        config.default_currency = currency;
    }

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    let db = Arc::new(Database::open(&config)?);

    match args.command {
        Command::Init => {
            let config_path = config.config_path();
            if !config_path.exists() {
                config.save(&config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }
            info!(
                database = %config.database_path().display(),
                "Storage initialized"
            );
        }
        Command::Stats => {
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::CreateUser {
            username,
            email,
            first_name,
            last_name,
        } => {
            let services = Services::new(db, &config);
            let user = services.users.create(CreateUserInput {
                id: None,
                username,
                email,
                first_name,
                last_name,
            })?;
            println!("{}", user.id);
        }
    }

    Ok(())
}
