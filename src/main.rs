use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use jobboard::config::{DEFAULT_CONFIG_PATH, JobboardConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(version, about = "Job application tracker with a synced Kanban board")]
pub struct Cli {
    /// Path to jobboard.toml
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dashboard server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Directory holding the built frontend
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a local Vite dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and its tables, then exit
    InitDb {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Work with your board from the terminal
    Board {
        /// Server base URL
        #[arg(long, env = "JOBBOARD_SERVER_URL")]
        server: Option<String>,

        /// Session token
        #[arg(long, env = "JOBBOARD_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[command(subcommand)]
        command: BoardCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Check the configuration for problems
    Validate,
    /// Write a default jobboard.toml
    Init,
}

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    /// Print every column and its cards
    Show,
    /// Add a job application
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        company: String,
        /// Column key (defaults to "applied")
        #[arg(long, default_value = "")]
        status: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Move a card to another column or position
    Move {
        task_id: String,
        /// Destination column key
        column: String,
        /// Position in the destination column (defaults to the end)
        #[arg(long)]
        index: Option<usize>,
    },
    /// Edit a card; omitted fields keep their current value
    Edit {
        task_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the card's description
        #[arg(long)]
        clear_description: bool,
    },
    /// Delete a card
    Delete { task_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = JobboardConfig::resolve(&cli.config)?;
    if cli.verbose {
        config.logging.filter = "debug".to_string();
    }
    jobboard::logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            static_dir,
            dev,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(db_path) = db_path {
                config.server.db_path = db_path;
            }
            if static_dir.is_some() {
                config.server.static_dir = static_dir;
            }
            config.server.dev_mode |= dev;
            cmd::cmd_serve(config).await?;
        }
        Commands::InitDb { db_path } => {
            if let Some(db_path) = db_path {
                config.server.db_path = db_path;
            }
            cmd::cmd_init_db(&config)?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command)?,
        Commands::Board {
            server,
            token,
            command,
        } => {
            if let Some(server) = server {
                config.client.server_url = server;
            }
            if token.is_some() {
                config.client.token = token;
            }
            cmd::cmd_board(&config.client, command).await?;
        }
    }

    Ok(())
}
