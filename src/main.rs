use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod auth;
mod compare;
mod config;
mod db;
mod error;
mod filters;
mod import;
#[cfg(test)]
mod memory;
mod models;
mod outliers;
mod registry;
mod report;
mod server;
mod stats;
mod store;

use compare::Dimension;
use config::Config;
use db::PgStore;
use filters::StatsParams;
use server::AppState;
use store::EntityStore;

#[derive(Parser)]
#[command(name = "gradebook")]
#[command(about = "Gradebook statistics service for Italian schools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small demo dataset
    Seed,
    /// Bulk-load the CSV export of the school dataset
    Import {
        #[arg(long)]
        dir: PathBuf,
        /// Empty every table before loading
        #[arg(long)]
        replace: bool,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Generate a markdown statistics report
    Report {
        #[command(flatten)]
        filters: StatsParams,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Count orphan references without modifying anything
    CheckIntegrity {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { dir, replace } => {
            let summaries = import::import_dir(&pool, &dir, replace).await?;
            for summary in summaries {
                match summary.rows {
                    Some(rows) => println!(
                        "{}: inserted {} of {rows} rows.",
                        summary.file, summary.inserted
                    ),
                    None => println!("{}: not found, skipped.", summary.file),
                }
            }
        }
        Commands::Serve { port } => {
            let state = AppState {
                store: Arc::new(PgStore::new(pool.clone())),
                calendar: config.calendar,
            };
            server::serve(state, port.unwrap_or(config.port)).await?;
        }
        Commands::Report { filters, out } => {
            let store = PgStore::new(pool.clone());
            let statistics = stats::Statistics::new(&store, &config.calendar);

            let mut rankings = Vec::new();
            for dimension in [Dimension::Area, Dimension::Region, Dimension::Track] {
                rankings.push((dimension, statistics.compare(dimension).await?));
            }
            let data = report::ReportData {
                general: statistics.general(&filters).await?,
                distribution: statistics.grade_distribution(&filters).await?,
                averages: statistics.average_per_subject(&filters).await?,
                rankings,
            };

            let report = report::build_report(&report::describe_filters(&filters), &data);
            std::fs::write(&out, report)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::CheckIntegrity { out } => {
            let counts = PgStore::new(pool.clone()).integrity().await?;
            let report = report::build_integrity_report(&counts);
            match out {
                Some(out) => {
                    std::fs::write(&out, report)
                        .with_context(|| format!("writing {}", out.display()))?;
                    println!("Integrity report written to {}.", out.display());
                }
                None => print!("{report}"),
            }
        }
    }

    pool.close().await;
    info!("Connection pool closed");
    Ok(())
}
