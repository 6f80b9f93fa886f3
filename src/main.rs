use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fleet_lite::config::RegistryConfig;
use fleet_lite::job::Job;
use fleet_lite::registry::{derive_event, KeyLayout, Lookup, Registry};
use fleet_lite::store::snapshot::load_snapshot;
use fleet_lite::store::Notification;

#[derive(Parser, Debug)]
#[command(name = "fleet-lite")]
#[command(version)]
#[command(about = "Inspect a job registry snapshot and replay store notifications")]
#[command(propagate_version = true)]
struct Args {
    /// Root of the registry key-space
    #[arg(long, global = true, default_value = "/fleet")]
    prefix: String,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List jobs, optionally only those assigned to one machine
    Jobs {
        /// Snapshot file (flat JSON object of key -> value)
        #[arg(long, short = 's')]
        snapshot: PathBuf,

        /// Only jobs scheduled to this machine boot ID
        #[arg(long)]
        machine: Option<String>,
    },

    /// List payloads
    Payloads {
        #[arg(long, short = 's')]
        snapshot: PathBuf,
    },

    /// Show one job and its assignment
    Job {
        #[arg(long, short = 's')]
        snapshot: PathBuf,

        /// Job name
        name: String,
    },

    /// Derive events from a file of JSON-lines store notifications
    Replay {
        /// Notification log, one JSON object per line
        file: PathBuf,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobListItem {
    name: String,
    payload: String,
    target: Option<String>,
}

#[derive(Serialize)]
struct JobDetailOutput {
    job: Job,
    target: Option<String>,
}

#[derive(Serialize)]
struct PayloadListItem {
    name: String,
    unit_bytes: usize,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn open_registry(prefix: &str, snapshot: &Path) -> Result<Registry, Box<dyn std::error::Error>> {
    let store = load_snapshot(snapshot)?;
    Ok(Registry::new(Arc::new(store), RegistryConfig::new(prefix)))
}

async fn target_of(registry: &Registry, name: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
    Ok(registry.get_job_target(name).await.into_result()?)
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_jobs(
    registry: &Registry,
    machine: Option<String>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = match &machine {
        Some(boot_id) => registry.get_all_jobs_by_machine(boot_id).await?,
        None => registry.get_all_jobs().await?,
    };

    let mut items = Vec::with_capacity(jobs.len());
    for job in jobs {
        let target = target_of(registry, &job.name).await?;
        items.push(JobListItem {
            name: job.name,
            payload: job.payload.name,
            target,
        });
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!("{:<32} {:<32} TARGET", "JOB", "PAYLOAD");
            println!("{}", "-".repeat(78));
            for item in &items {
                println!(
                    "{:<32} {:<32} {}",
                    item.name,
                    item.payload,
                    item.target.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

async fn handle_payloads(
    registry: &Registry,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut items: Vec<PayloadListItem> = registry
        .get_all_payloads()
        .await?
        .into_iter()
        .map(|p| PayloadListItem {
            unit_bytes: p.unit.len(),
            name: p.name,
        })
        .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No payloads found.");
                return Ok(());
            }
            println!("{:<40} UNIT BYTES", "PAYLOAD");
            println!("{}", "-".repeat(52));
            for item in &items {
                println!("{:<40} {}", item.name, item.unit_bytes);
            }
        }
    }
    Ok(())
}

async fn handle_job(
    registry: &Registry,
    name: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let job = match registry.get_job(&name).await {
        Lookup::Found(job) => job,
        Lookup::NotFound => {
            eprintln!("Error: job {name} not found");
            std::process::exit(1);
        }
        Lookup::Unavailable(e) => return Err(e.into()),
    };
    let target = target_of(registry, &name).await?;

    match output_format {
        OutputFormat::Json => {
            let output = JobDetailOutput { job, target };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job:     {}", job.name);
            println!("Payload: {}", job.payload.name);
            println!("Target:  {}", target.as_deref().unwrap_or("(unscheduled)"));
            println!();
            println!("{}", job.payload.unit);
        }
    }
    Ok(())
}

fn handle_replay(
    prefix: &str,
    file: &Path,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs_key = KeyLayout::new(prefix).jobs();
    let contents = std::fs::read_to_string(file)?;

    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let notification: Notification = match serde_json::from_str(line) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "Skipping malformed notification");
                continue;
            }
        };
        let Some(event) = derive_event(&jobs_key, &notification) else {
            continue;
        };

        match output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
            OutputFormat::Table => println!("{:<24} {}", event.kind(), event.context()),
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Jobs { snapshot, machine } => {
            let registry = open_registry(&args.prefix, &snapshot)?;
            handle_jobs(&registry, machine, &args.output).await?;
        }
        Commands::Payloads { snapshot } => {
            let registry = open_registry(&args.prefix, &snapshot)?;
            handle_payloads(&registry, &args.output).await?;
        }
        Commands::Job { snapshot, name } => {
            let registry = open_registry(&args.prefix, &snapshot)?;
            handle_job(&registry, name, &args.output).await?;
        }
        Commands::Replay { file } => {
            handle_replay(&args.prefix, &file, &args.output)?;
        }
    }

    Ok(())
}
