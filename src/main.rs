use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

mod config;
mod convert;
mod email;
mod error;
mod fetch;
mod logging;
mod models;
mod parser;
mod pipeline;
mod report;
mod snapshot;
mod store;

use crate::config::Config;
use crate::fetch::RenderClient;
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "fringe_scraper")]
#[command(about = "Edinburgh Fringe listings scraper and change tracker")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape listings and merge them into the canonical tables
    Update {
        /// Genres to scrape (comma-separated), e.g. COMEDY,THEATRE
        #[arg(long, default_value = "COMEDY")]
        genres: String,
        /// Full mode: the scrape replaces each scraped genre wholesale
        #[arg(long)]
        full: bool,
        /// Email the change report after the run
        #[arg(long)]
        email: bool,
    },
    /// Compare two snapshots and print the change report
    Diff {
        /// Older snapshot file (defaults to the second most recent)
        #[arg(long)]
        old: Option<PathBuf>,
        /// Newer snapshot file (defaults to the most recent)
        #[arg(long)]
        new: Option<PathBuf>,
        /// Print the HTML rendering instead of plain text
        #[arg(long)]
        html: bool,
    },
    /// Convert the canonical performance table to derived CSV formats
    Convert {
        /// Input CSV (defaults to the canonical performance table)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Formats to produce (comma-separated): cleaned, summary, wide
        #[arg(long, default_value = "cleaned,summary,wide")]
        formats: String,
        /// Base name for the output files
        #[arg(long, default_value = "festival")]
        base_name: String,
    },
}

/// Locate the two most recent snapshots: the latest, and the latest from an
/// earlier date.
fn latest_snapshot_pair(snapshot_dir: &str) -> Option<(PathBuf, PathBuf)> {
    let newest = snapshot::find_latest_snapshot(snapshot_dir, None)?;
    let newest_date = newest
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.chars().take(10).collect::<String>())?;
    let prior = snapshot::find_latest_snapshot(snapshot_dir, Some(&newest_date))?;
    Some((prior, newest))
}

fn send_report(config: &Config, diff: &snapshot::SnapshotDiff) -> bool {
    let subject = format!(
        "Edinburgh Fringe Daily Update - {} ({} changes)",
        diff.new_snapshot_date,
        diff.total_changes()
    );
    let text = report::format_diff_as_text(diff);
    let html = report::format_diff_as_html(diff);
    email::send_email(&config.email, &subject, &text, &html)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Update { genres, full, email } => {
            let genre_list: Vec<String> = genres
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            println!("🔄 Running update for genres: {}", genre_list.join(", "));
            let client = RenderClient::new(&config.scrape)?;
            let pipeline = Pipeline::new(&client, &config);

            let outcome = pipeline.run_update(&genre_list, full).await?;
            println!("\n📊 Update results:");
            println!("   Shows scraped: {}", outcome.shows_scraped);
            println!("   Performances: {}", outcome.performances);
            println!("   Shows without details: {}", outcome.degraded_shows);
            println!("   Venues enriched: {}", outcome.venues_enriched);

            match &outcome.diff {
                Some(diff) => {
                    println!("\n{}", report::format_diff_as_text(diff));
                    if email {
                        if send_report(&config, diff) {
                            println!("📧 Report emailed");
                        } else {
                            println!("⚠️  Report email failed (see logs)");
                        }
                    }
                }
                None => println!("\nℹ️  No prior snapshot, no comparison possible."),
            }
        }
        Commands::Diff { old, new, html } => {
            let (old_path, new_path) = match (old, new) {
                (Some(old), Some(new)) => (old, new),
                (old, new) => {
                    let pair = latest_snapshot_pair(&config.scrape.snapshot_dir);
                    match pair {
                        Some((latest_prior, latest)) => {
                            (old.unwrap_or(latest_prior), new.unwrap_or(latest))
                        }
                        None => {
                            println!("ℹ️  Fewer than two snapshots available, no comparison possible.");
                            return Ok(());
                        }
                    }
                }
            };

            info!(
                "Comparing {} -> {}",
                old_path.display(),
                new_path.display()
            );
            let old_rows = snapshot::load_snapshot(&old_path)?;
            let new_rows = snapshot::load_snapshot(&new_path)?;
            let diff = snapshot::compare_snapshots(&old_rows, &new_rows);

            if html {
                println!("{}", report::format_diff_as_html(&diff));
            } else {
                println!("{}", report::format_diff_as_text(&diff));
            }
        }
        Commands::Convert { input, formats, base_name } => {
            let input = input.unwrap_or_else(|| {
                PathBuf::from(&config.scrape.current_dir).join(pipeline::PERFORMANCES_FILE)
            });
            let format_list: Vec<&str> = formats
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();

            println!("🔁 Converting {}...", input.display());
            let rows: Vec<models::PerfRow> = store::load_table(&input)?;
            if rows.is_empty() {
                println!("⚠️  No rows in {}", input.display());
                return Ok(());
            }

            match convert::save_all_formats(
                &rows,
                &config.scrape.output_dir,
                &base_name,
                Some(&format_list),
                config.scrape.default_year,
            ) {
                Ok(results) => {
                    for (format, path) in results {
                        println!("💾 Saved {} to {}", format, path.display());
                    }
                }
                Err(e) => {
                    error!("Conversion failed: {}", e);
                    println!("❌ Conversion failed: {}", e);
                }
            }
        }
    }

    Ok(())
}
