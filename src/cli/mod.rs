pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use client::ApiClient;

#[derive(Parser)]
#[command(name = "bosync")]
#[command(about = "bosync - trigger and inspect spreadsheet migrations on a running back-office API")]
#[command(version)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "BOSYNC_SERVER",
        default_value = "http://127.0.0.1:3000",
        help = "Base URL of the back-office API"
    )]
    pub server: String,

    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the full migration for every entity")]
    RunAll,

    #[command(about = "Run the full migration for one entity")]
    Run {
        #[arg(help = "Entity name, e.g. \"Home Visits\" or home-visit")]
        name: String,
    },

    #[command(about = "Scheduler status, or sync status of one entity")]
    Status {
        #[arg(help = "Entity name")]
        entity: Option<String>,
    },

    #[command(about = "Import sheet rows into the database")]
    Import {
        #[arg(help = "Entity name")]
        entity: String,
    },

    #[command(about = "Write unsynced records to the sheet")]
    Sync {
        #[arg(help = "Entity name")]
        entity: String,
    },

    #[command(about = "Import then sync one entity")]
    Migrate {
        #[arg(help = "Entity name")]
        entity: String,
    },

    #[command(about = "Show sheet headers and sample rows")]
    Headers {
        #[arg(help = "Entity name")]
        entity: String,
    },

    #[command(about = "Compare a record with its sheet row")]
    Compare {
        #[arg(help = "Entity name")]
        entity: String,
        #[arg(help = "Sheet ID of the record")]
        sheet_id: String,
    },

    #[command(about = "List registered entities")]
    Entities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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
    let client = ApiClient::new(&cli.server)?;

    match cli.command {
        Commands::RunAll => commands::scheduler::run_all(&client, &output_format).await,
        Commands::Run { name } => commands::scheduler::run_one(&client, &name, &output_format).await,
        Commands::Status { entity: None } => commands::scheduler::status(&client, &output_format).await,
        Commands::Status { entity: Some(entity) } => {
            commands::migration::status(&client, &entity, &output_format).await
        }
        Commands::Import { entity } => commands::migration::import(&client, &entity, &output_format).await,
        Commands::Sync { entity } => commands::migration::sync(&client, &entity, &output_format).await,
        Commands::Migrate { entity } => commands::migration::migrate(&client, &entity, &output_format).await,
        Commands::Headers { entity } => commands::migration::headers(&client, &entity, &output_format).await,
        Commands::Compare { entity, sheet_id } => {
            commands::migration::compare(&client, &entity, &sheet_id, &output_format).await
        }
        Commands::Entities => commands::server::entities(&client, &output_format).await,
    }
}
