use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use logscan::config::{AppConfig, LogFormat, LoggingConfig};
use logscan::jobs::{JobRequest, JobService};
use logscan::storage::Store;

#[derive(Parser)]
#[command(
    name = "logscan",
    about = "Scheduled Kubernetes log scanning with AI incident analysis",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArg {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (API server + scheduler)
    Serve {
        /// Bind address, overrides the config file
        #[arg(long)]
        bind: Option<String>,

        #[command(flatten)]
        config: ConfigArg,
    },

    /// Manage log scan jobs in the snapshot file
    Jobs {
        #[command(subcommand)]
        action: JobsAction,

        #[command(flatten)]
        config: ConfigArg,
    },

    /// Inspect recorded incidents
    Incidents {
        #[command(subcommand)]
        action: IncidentsAction,

        #[command(flatten)]
        config: ConfigArg,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// List a user's jobs
    List {
        #[arg(long)]
        user: String,
    },

    /// Add a new job
    Add {
        #[arg(long)]
        user: String,

        /// Kubernetes namespace to scan
        #[arg(long)]
        namespace: String,

        /// Seconds between runs
        #[arg(long, allow_negative_numbers = true)]
        interval: i64,

        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, default_value = "")]
        cluster: String,

        /// Log level to match (repeatable)
        #[arg(long = "level")]
        levels: Vec<String>,

        /// Restrict the scan to this pod (repeatable)
        #[arg(long = "pod")]
        pods: Vec<String>,

        /// Pipeline stage to enable (repeatable, default all)
        #[arg(long = "service")]
        services: Vec<String>,
    },

    /// Remove a job
    Remove {
        #[arg(long)]
        user: String,

        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum IncidentsAction {
    /// List a user's most recent incidents
    List {
        #[arg(long)]
        user: String,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn load_config(arg: &ConfigArg) -> Result<AppConfig> {
    let config = AppConfig::load_or_default(arg.config.as_deref())?;
    init_tracing(&config.logging);
    Ok(config)
}

/// Store for the offline commands, loaded from the snapshot files.
async fn open_store(config: &AppConfig) -> Result<Store> {
    let store = Store::new(&config.storage);
    store.load_jobs().await.context("loading jobs snapshot")?;
    store
        .load_incidents()
        .await
        .context("loading incidents snapshot")?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            let mut config = load_config(&config)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting logscan gateway");
            logscan::serve(config).await?;
        }
        Commands::Jobs { action, config } => {
            let config = load_config(&config)?;
            let service = JobService::new(open_store(&config).await?);

            match action {
                JobsAction::List { user } => {
                    let jobs = service.list_jobs(&user).await;
                    if jobs.is_empty() {
                        println!("No jobs found.");
                    } else {
                        println!(
                            "{:<36} | {:<20} | {:<15} | {:>8} | Last run",
                            "ID", "Name", "Namespace", "Interval"
                        );
                        println!("{:-<36}-|-{:-<20}-|-{:-<15}-|-{:->8}-|-{:-<25}", "", "", "", "", "");
                        for job in jobs {
                            println!(
                                "{:<36} | {:<20} | {:<15} | {:>7}s | {}",
                                job.id,
                                job.name,
                                job.namespace,
                                job.interval,
                                job.last_run.to_rfc3339()
                            );
                        }
                    }
                }
                JobsAction::Add {
                    user,
                    namespace,
                    interval,
                    name,
                    cluster,
                    levels,
                    pods,
                    services,
                } => {
                    let job = service
                        .create_job(
                            &user,
                            JobRequest {
                                name,
                                cluster,
                                namespace,
                                log_levels: levels,
                                interval,
                                microservices: services,
                                pods,
                            },
                        )
                        .await?;
                    service.store().save_jobs().await?;
                    println!("Job '{}' added.", job.id);
                }
                JobsAction::Remove { user, id } => {
                    service.delete_job(&user, &id).await?;
                    service.store().save_jobs().await?;
                    println!("Job '{}' removed.", id);
                }
            }
        }
        Commands::Incidents { action, config } => {
            let config = load_config(&config)?;
            let service = JobService::new(open_store(&config).await?);

            match action {
                IncidentsAction::List { user } => {
                    let incidents = service.recent_incidents(&user).await;
                    if incidents.is_empty() {
                        println!("No incidents found.");
                    } else {
                        println!("{}", serde_json::to_string_pretty(&incidents)?);
                    }
                }
            }
        }
    }

    Ok(())
}
