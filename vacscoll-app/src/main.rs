use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vacscoll_common::observability::init_logging;
use vacscoll_config::{VacscollConfig, VacscollConfigLoader};

use pipeline::{Pipeline, SearchJob, user_message};
mod pipeline;

#[derive(Debug, Parser)]
#[command(name = "vacscoll", version, about = "Collect new job vacancies from hh.ru")]
struct Cli {
    /// YAML configuration file; a missing file means built-in defaults.
    #[arg(long, env = "VACSCOLL_CONFIG", default_value = "vacscoll.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search vacancies and print the ones not delivered before.
    Search {
        /// Search words, e.g. `--keywords "rust developer"`.
        #[arg(long, short, required = true, num_args = 1..)]
        keywords: Vec<String>,
        /// Place name to narrow the search to, e.g. "Москва".
        #[arg(long, short)]
        location: Option<String>,
        /// Print every match, including ones delivered in earlier runs.
        #[arg(long)]
        no_dedup: bool,
        /// Fetch the full vacancy payloads for the results.
        #[arg(long)]
        details: bool,
        /// One JSON object per line instead of text summaries.
        #[arg(long)]
        json: bool,
    },
    /// Look up the provider area id for a place name.
    Area { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Env wins over the file.
    let cfg: VacscollConfig = VacscollConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let log_path = init_logging(cfg.logging.to_log_config())?;
    tracing::info!(log = %log_path.display(), config = %cli.config.display(), "vacscoll.start");

    let pipeline = Pipeline::from_config(cfg)?;

    match cli.command {
        Command::Search {
            keywords,
            location,
            no_dedup,
            details,
            json,
        } => {
            let job = SearchJob {
                keywords,
                location,
                dedup: !no_dedup,
                details,
            };
            let records = match pipeline.search(&job).await {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(error = %err, "vacscoll.search.failed");
                    eprintln!("{}", user_message(&err));
                    std::process::exit(1);
                }
            };

            let deliverable: Vec<_> = records.iter().filter(|r| r.is_deliverable()).collect();
            if deliverable.is_empty() {
                println!("Nothing found.");
                return Ok(());
            }
            for record in &deliverable {
                if json {
                    println!("{}", serde_json::to_string(record)?);
                } else {
                    println!("{record}\n");
                }
            }
            if !json {
                println!("Vacancies found: {}", deliverable.len());
            }
        }
        Command::Area { name } => match pipeline.resolve_area(&name).await {
            Ok(Some(id)) => println!("{id}"),
            Ok(None) => println!("Nothing found."),
            Err(err) => {
                tracing::error!(error = %err, "vacscoll.area.failed");
                eprintln!("{}", user_message(&err));
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
