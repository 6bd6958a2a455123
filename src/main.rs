use std::path::PathBuf;
use std::process::{Command, ExitCode, ExitStatus};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cronlog::clock::{format_timestamp, SystemClock};
use cronlog::config::CronLogConfig;
use cronlog::store::SqliteRunStore;
use cronlog::{storage, RunTracker};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cronlog",
    about = "Run bookkeeping for recurring jobs",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $CRONLOG_CONFIG, then ./cronlog.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the config file
    #[arg(long, global = true, env = "CRONLOG_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cron_log table if it does not exist
    Migrate,

    /// Show when a script last completed successfully
    LastRan {
        /// Script name, e.g. IntegrationX/fullImport
        #[arg(long)]
        script: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List recent runs of a script, finished or not
    History {
        #[arg(long)]
        script: String,

        #[arg(long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Run a command and record it as a run of <script>
    Exec {
        #[arg(long)]
        script: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CronLogConfig::load(path)?,
        None => CronLogConfig::load_or_default()?,
    };
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    init_tracing(&config);

    let tz = config.clock.tz()?;
    let pool = storage::open_pool(&config.database.path)?;
    let store = SqliteRunStore::new(pool);

    match cli.command {
        Commands::Migrate => {
            // open_pool has already migrated.
            println!("cron_log ready at {}", config.database.path.display());
        }
        Commands::LastRan { script, json } => {
            let last = RunTracker::last_ran(&store, tz, &script)?;
            if json {
                let value = serde_json::json!({
                    "script": script,
                    "last_ran": last.as_ref().map(format_timestamp),
                    "timezone": tz.name(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                match last {
                    Some(ts) => println!("{} {}", format_timestamp(&ts), tz.name()),
                    None => println!("never"),
                }
            }
        }
        Commands::History {
            script,
            limit,
            json,
        } => {
            let runs = RunTracker::history(&store, &script, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No runs found for '{}'.", script);
            } else {
                println!(
                    "{:<8} | {:<19} | {:<19} | {:<8} | Message",
                    "ID", "Started", "Exited", "Status"
                );
                println!("{:-<8}-|-{:-<19}-|-{:-<19}-|-{:-<8}-|-{:-<20}", "", "", "", "", "");
                for run in runs {
                    let status = if run.is_complete() { "complete" } else { "started" };
                    println!(
                        "{:<8} | {:<19} | {:<19} | {:<8} | {}",
                        run.id,
                        run.start_time,
                        run.exit_time.as_deref().unwrap_or("-"),
                        status,
                        run.message
                    );
                }
            }
        }
        Commands::Exec { script, command } => {
            let clock = SystemClock::new(tz);
            let mut tracker = RunTracker::new(&store, &clock);
            tracker.start(&script)?;

            let (program, args) = command
                .split_first()
                .context("no command given")?;
            tracing::info!(%script, %program, "executing");

            let status = match Command::new(program).args(args).status() {
                Ok(status) => status,
                Err(e) => {
                    record_outcome(
                        &mut tracker,
                        &script,
                        &format!("failed to launch {}: {}", program, e),
                        false,
                    );
                    return Err(e).with_context(|| format!("failed to launch {}", program));
                }
            };

            record_exit(&mut tracker, &script, status);

            let code = status.code().unwrap_or(1);
            return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(config: &CronLogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Write the child's outcome to the run. Bookkeeping failures are logged and
/// never change the exit code the caller sees.
fn record_exit(tracker: &mut RunTracker<'_>, script: &str, status: ExitStatus) {
    record_outcome(tracker, script, &describe_exit(status), status.success());
    if !status.success() {
        tracing::warn!(%script, %status, "command failed, run left unfinished");
    }
}

fn record_outcome(tracker: &mut RunTracker<'_>, script: &str, message: &str, success: bool) {
    if let Err(e) = tracker.update(message) {
        tracing::warn!(%script, error = %e, "failed to record command exit");
    }
    if success {
        if let Err(e) = tracker.finish() {
            tracing::warn!(%script, error = %e, "failed to mark run complete");
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
