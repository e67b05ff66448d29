//! Command line front-end for the target database API.
//!
//! ## Usage
//!
//! ```bash
//! export VWS_ACCESS_KEY=... VWS_SECRET_KEY=...
//!
//! vws list
//! vws get --target-id 0b4a8b7c
//! vws insert --target '{"name":"tower","width":32.0,"image":"iVBORw0KGgo..."}'
//! vws update --target-id 0b4a8b7c --target '{"name":"tower","width":16.0,"image":"..."}'
//! vws delete --target-id 0b4a8b7c
//! vws check-similar --target-id 0b4a8b7c
//! vws summary-report --target-id 0b4a8b7c
//! vws database-summary
//! ```
//!
//! Set `RUST_LOG=vws_client=debug` to follow each attempt.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vws_client::types::TargetRequest;
use vws_client::{AccessKeys, Error, TargetService};

const APPLICATION_NAME: &str = "vws-cli";

/// Manage the targets of a cloud recognition database
#[derive(Parser)]
#[command(name = "vws", version, about, long_about = None)]
struct Cli {
    /// Endpoint of the target database API
    #[arg(long, env = "VWS_BASE_URL", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct KeyArgs {
    /// Server access key of the database
    #[arg(long, env = "VWS_ACCESS_KEY")]
    access_key: String,

    /// Server secret key of the database
    #[arg(long, env = "VWS_SECRET_KEY", hide_env_values = true)]
    secret_key: String,
}

impl KeyArgs {
    fn access_keys(&self) -> AccessKeys {
        AccessKeys::new(&self.access_key, &self.secret_key)
    }
}

#[derive(Subcommand)]
enum Command {
    /// List the identifiers of all targets
    List {
        #[command(flatten)]
        keys: KeyArgs,
    },
    /// Show one target record
    Get {
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long)]
        target_id: String,
    },
    /// Add a target described as JSON
    Insert {
        #[command(flatten)]
        keys: KeyArgs,
        /// Target as JSON: name, width, image and optional active_flag, application_metadata
        #[arg(long)]
        target: String,
    },
    /// Replace a target with the one described as JSON
    Update {
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long)]
        target_id: String,
        #[arg(long)]
        target: String,
    },
    /// Delete a target
    Delete {
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long)]
        target_id: String,
    },
    /// List targets similar to the given one
    CheckSimilar {
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long)]
        target_id: String,
    },
    /// Show the summary report of one target
    SummaryReport {
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long)]
        target_id: String,
    },
    /// Show the summary report of the database
    DatabaseSummary {
        #[command(flatten)]
        keys: KeyArgs,
    },
}

fn parse_target(json: &str) -> Result<TargetRequest, Error> {
    serde_json::from_str(json)
        .map_err(|e| Error::ConfigurationError(format!("Invalid --target JSON: {e}")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = TargetService::builder().application_name(APPLICATION_NAME);
    if let Some(base_url) = &cli.base_url {
        builder = builder.base_url(base_url)?;
    }
    let service = builder.build()?;
    let targets = service.target_list();

    match cli.command {
        Command::List { keys } => {
            let result = targets.list(&keys.access_keys()).execute().await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
            println!("Targets: {}", result.results.join(", "));
        }
        Command::Get { keys, target_id } => {
            let result = targets.get(&keys.access_keys(), target_id).execute().await?;
            let record = &result.target_record;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
            println!("Status: {:?}", result.status);
            println!("Target ID: {}", record.target_id);
            println!("Active Flag: {}", record.active_flag);
            println!("Tracking Rating: {}", record.tracking_rating);
            println!("Width: {}", record.width);
            println!("Name: {}", record.name);
        }
        Command::Insert { keys, target } => {
            let target = parse_target(&target)?;
            let result = targets
                .insert(&keys.access_keys(), &target)
                .execute()
                .await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
            println!("Inserted Target ID: {}", result.target_id);
        }
        Command::Update {
            keys,
            target_id,
            target,
        } => {
            let target = parse_target(&target)?;
            let result = targets
                .update(&keys.access_keys(), target_id, &target)
                .execute()
                .await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
        }
        Command::Delete { keys, target_id } => {
            let result = targets
                .delete(&keys.access_keys(), target_id)
                .execute()
                .await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
        }
        Command::CheckSimilar { keys, target_id } => {
            let result = targets
                .check_similar(&keys.access_keys(), target_id)
                .execute()
                .await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
            println!("Similar Targets: {}", result.similar_targets.join(", "));
        }
        Command::SummaryReport { keys, target_id } => {
            let result = targets
                .target_summary(&keys.access_keys(), target_id)
                .execute()
                .await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
            println!("Status: {:?}", result.status);
            println!("Total Reco: {}", result.total_recos);
            println!("Active: {}", result.active_flag);
            println!("Database Name: {}", result.database_name);
            println!("Current Month Recos: {}", result.current_month_recos);
            println!("Previous Month Recos: {}", result.previous_month_recos);
            println!("Target Name: {}", result.target_name);
            println!("Tracking Rating: {}", result.tracking_rating);
            println!("Reco Rating: {}", result.reco_rating);
            println!("Upload Date: {}", result.upload_date);
        }
        Command::DatabaseSummary { keys } => {
            let result = targets
                .database_summary(&keys.access_keys())
                .execute()
                .await?;
            println!("Transaction ID: {}", result.base.transaction_id);
            println!("Result Code: {}", result.base.result_code);
            println!("Name: {}", result.name);
            println!("Active Images: {}", result.active_images);
            println!("Failed Images: {}", result.failed_images);
            println!("Inactive Images: {}", result.inactive_images);
        }
    }

    Ok(())
}
