pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::{config, ConfigError};
use crate::database::Database;

#[derive(Parser)]
#[command(name = "docket")]
#[command(about = "Docket admin CLI - migrations, SuperAdmins and firm bootstrap")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Platform operator accounts")]
    Superadmin {
        #[command(subcommand)]
        cmd: commands::superadmin::SuperadminCommands,
    },

    #[command(about = "Firm provisioning and status")]
    Firm {
        #[command(subcommand)]
        cmd: commands::firm::FirmCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let db = connect().await?;

    let result = match cli.command {
        Commands::Migrate => commands::migrate::handle(&db, output_format).await,
        Commands::Superadmin { cmd } => commands::superadmin::handle(cmd, &db, output_format).await,
        Commands::Firm { cmd } => commands::firm::handle(cmd, &db, output_format).await,
    };

    db.close().await;
    result
}

/// The CLI talks to the database directly, using the server's configuration
async fn connect() -> anyhow::Result<Database> {
    let config = config();
    if config.database.url.trim().is_empty() {
        return Err(ConfigError::Invalid("DATABASE_URL", "is not set".to_string()).into());
    }
    Ok(Database::connect(&config.database).await?)
}
