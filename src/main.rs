use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;

use jobcz_pipeline::config::Settings;
use jobcz_pipeline::db;
use jobcz_pipeline::llm::OpenAiClient;
use jobcz_pipeline::rag;
use jobcz_pipeline::tracker::JobTracker;
use jobcz_pipeline::workflow::{live_loader, RunOutcome, Workflow, JOBCZ_WORKFLOW};

#[derive(Parser)]
#[command(name = "jobcz", about = "jobs.cz listing ETL and job-offer Q&A")]
struct Cli {
    /// Settings file (default: ./jobcz.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape search-result pages into today's listing table
    Scrape {
        /// Number of result pages (default: scrape.page_limit)
        #[arg(short = 'n', long)]
        pages: Option<u32>,
    },
    /// Fetch detail pages for today's listings, then merge and save offers
    Details,
    /// Merge today's stored listings and backed-up details
    Merge,
    /// Re-chunk and embed all saved offers
    Embed {
        /// Embed each offer on its own document instead of chunking
        #[arg(long)]
        records: bool,
    },
    /// Full tracked workflow: scrape, details, merge, embed
    Run {
        /// Run even if today's run already succeeded
        #[arg(long)]
        force: bool,
        #[arg(short = 'n', long)]
        pages: Option<u32>,
    },
    /// Ask a question over the embedded offers
    Ask {
        question: String,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List tracked workflow runs
    Runs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    info!(database = ?settings.database.path, "Settings loaded");

    let conn = db::connect(&settings.database.path)?;
    let today = Local::now().format("%Y-%m-%d").to_string();

    match cli.command {
        Commands::Scrape { pages } => {
            let mut loader = live_loader(&conn, &settings, today.as_str())?;
            if let Some(n) = pages {
                loader = loader.with_page_limit(n);
            }
            let stats = loader.load_listing_pages()?;
            println!(
                "Loaded {} listings from {} pages ({} skipped) for {}",
                stats.rows,
                stats.pages_ok,
                stats.pages_failed,
                loader.load_date()
            );
        }
        Commands::Details => {
            let loader = live_loader(&conn, &settings, today.as_str())?;
            let details = loader.load_details()?;
            if details.from_backup {
                println!("No fresh detail pages, using {} backed-up rows", details.rows.len());
            } else {
                println!(
                    "Fetched {} detail pages ({} skipped)",
                    details.fetched, details.skipped
                );
            }
            let saved = loader.merge_and_persist(&details.rows)?;
            println!("Saved {} job offers", saved);
        }
        Commands::Merge => {
            let loader = live_loader(&conn, &settings, today.as_str())?;
            let saved = loader.merge_stored()?;
            println!("Saved {} job offers", saved);
        }
        Commands::Embed { records } => {
            let client = OpenAiClient::new(&settings.openai)?;
            let loader = live_loader(&conn, &settings, today.as_str())?.with_embedder(&client);
            if records {
                let n = loader.embed_records()?;
                println!("Embedded {} job offers", n);
            } else {
                let n = loader.split_and_embed()?;
                println!("Stored {} embedded chunks", n);
            }
        }
        Commands::Run { force, pages } => {
            let client = OpenAiClient::new(&settings.openai)?;
            let mut loader = live_loader(&conn, &settings, today.as_str())?.with_embedder(&client);
            if let Some(n) = pages {
                loader = loader.with_page_limit(n);
            }
            match Workflow::new(&conn).run(JOBCZ_WORKFLOW, &today, &mut loader, force)? {
                RunOutcome::Skipped { run_id } => {
                    println!("Run {} already completed for {}; use --force to rerun", run_id, today)
                }
                RunOutcome::Completed { run_id } => println!("Run {} completed", run_id),
            }
        }
        Commands::Ask { question, json } => {
            let client = OpenAiClient::new(&settings.openai)?;
            let resp = rag::vector_query(&conn, &client, &client, &question, settings.rag.top_k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                println!("{}", resp.response_text);
                if !resp.sources.is_empty() {
                    println!("\n({} sources)", resp.sources.len());
                }
            }
        }
        Commands::Runs => {
            let runs = JobTracker::new(&conn).list_jobs()?;
            if runs.is_empty() {
                println!("No workflow runs recorded.");
            }
            for run in runs {
                println!(
                    "{:>5}  {:<8} {}  {:<11} {} -> {}",
                    run.id,
                    run.job_type,
                    run.date,
                    run.status.name(),
                    run.start_date,
                    run.end_date.as_deref().unwrap_or("-")
                );
            }
        }
    }

    info!(elapsed_s = t0.elapsed().as_secs_f64(), "Done");
    Ok(())
}
