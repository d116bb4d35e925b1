//! The main entry point for the `rebatch` command-line application.
//!
//! This file is responsible for parsing command-line arguments, installing the
//! log subscriber and dispatching to the appropriate command in the `rebatch`
//! library.

use rebatch::cli::{self, Commands, SearchArgs};
use rebatch::config::{ConfigLoader, JobConfig};
use rebatch::errors::Result;
use rebatch::{finder, replacer, OutputFormat};
use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();
    init_logging(args.verbose);

    if let Err(e) = run(args.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Logs go to stderr. `RUST_LOG` picks the filter unless `--verbose` is set.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Find { search } => {
            let job = load_job(&search, JobConfig::default())?;
            finder::run_find(&job, OutputFormat::from(search.format.as_str()), search.output)
        }
        Commands::Replace {
            search,
            replacement,
            exclude,
            dry_run,
        } => {
            let extra = JobConfig {
                replacement,
                exclude,
                ..JobConfig::default()
            };
            let job = load_job(&search, extra)?;
            replacer::run_replace(
                &job,
                OutputFormat::from(search.format.as_str()),
                search.output,
                dry_run,
            )
        }
    }
}

/// Reads the job file, if any, and folds the command-line values into it.
fn load_job(search: &SearchArgs, extra: JobConfig) -> Result<JobConfig> {
    let from_file = match &search.config {
        Some(path) => {
            let working_dir = env::current_dir()?;
            let found = ConfigLoader::find_config(path, &working_dir)?;
            ConfigLoader::load_job_config(&found)?
        }
        None => JobConfig::default(),
    };
    Ok(from_file.merge(search.to_job()).merge(extra))
}
