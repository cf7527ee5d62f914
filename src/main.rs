use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use wardwork::board::db::BoardDb;
use wardwork::board::server::{ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "wardwork")]
#[command(version, about = "Realtime task board for ward building-cleaning sessions")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the board server
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "4180")]
        port: u16,

        /// Database path
        #[arg(long, default_value = ".wardwork/board.db")]
        db_path: PathBuf,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,
    },
    /// Initialize the database and exit
    InitDb {
        /// Database path
        #[arg(long, default_value = ".wardwork/board.db")]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { port, db_path, dev } => {
            start_server(ServerConfig {
                port,
                db_path,
                dev_mode: dev,
            })
            .await?;
        }
        Commands::InitDb { db_path } => {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            BoardDb::new(&db_path)
                .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;
            println!("Board database initialized at {}", db_path.display());
        }
    }

    Ok(())
}
