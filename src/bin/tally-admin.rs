use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally::config::Config;
use tally::counter::aggregator::{snapshot, StatsOptions};
use tally::counter::schema::repair;
use tally::counter::validate::{normalize_domain, normalize_project, ProjectParam};
use tally::storage::{CounterStore, FileStore};

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(about = "Tally counter store management CLI", long_about = None)]
struct Cli {
    /// Counter document to operate on (defaults to DATA_FILE)
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stats for a domain or one of its projects
    Show {
        /// Domain to report on
        domain: String,
        /// Restrict to a single project
        #[arg(short, long)]
        project: Option<String>,
        /// Include the visitor address map
        #[arg(long)]
        ips: bool,
        /// Include the per-project overview (domain queries only)
        #[arg(long)]
        projects: bool,
    },
    /// List all counted domains, busiest first
    List,
    /// Rewrite the document at the current schema version
    ///
    /// Writes the file directly rather than through the server's write queue.
    /// Stop the server first, or hits recorded during the repair may be lost.
    Repair,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let path = match cli.data_file {
        Some(path) => path,
        None => Config::from_env()?.storage.data_file,
    };
    let store = FileStore::new(path);

    match cli.command {
        Commands::Show {
            domain,
            project,
            ips,
            projects,
        } => {
            let Some(domain) = normalize_domain(&domain) else {
                bail!("invalid domain '{}'", domain);
            };
            let project = match normalize_project(project.as_deref()) {
                ProjectParam::Absent => None,
                ProjectParam::Valid(p) => Some(p),
                ProjectParam::Invalid => bail!("invalid project"),
            };

            let doc = store.load().await?;
            let options = StatsOptions {
                include_ips: ips,
                include_projects: projects,
            };
            let snap = snapshot(&doc, &domain, project.as_deref(), options);
            println!("{}", serde_json::to_string_pretty(&snap)?);
        }
        Commands::List => {
            let doc = store.load().await?;
            if doc.domains.is_empty() {
                println!("No domains counted yet.");
                return Ok(());
            }

            let mut rows: Vec<_> = doc.domains.iter().collect();
            rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));

            println!("{:<40} {:>10} {:>9} {}", "Domain", "Total", "Projects", "Last hit");
            println!("{}", "-".repeat(90));
            for (domain, record) in rows {
                println!(
                    "{:<40} {:>10} {:>9} {}",
                    domain,
                    record.total,
                    record.projects.len(),
                    format_ts(record.last)
                );
            }
        }
        Commands::Repair => {
            let raw = match tokio::fs::read(store.path()).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("⚠ {} does not exist, nothing to repair", store.path().display());
                    return Ok(());
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to read {}", store.path().display()))
                }
            };

            let document = serde_json::from_slice::<serde_json::Value>(&raw).with_context(|| {
                format!(
                    "{} is not valid JSON; refusing to overwrite it",
                    store.path().display()
                )
            })?;
            let (doc, report) = repair(document);
            store.save(&doc).await?;

            if report.is_clean() {
                println!("✓ Document already current, rewritten unchanged");
            } else {
                println!(
                    "✓ Migrated from schema v{} to v{}, fixed {} field(s)",
                    report.source_version, doc.schema_version, report.fixed_fields
                );
            }
        }
    }

    Ok(())
}

fn format_ts(millis: i64) -> String {
    if millis <= 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}
