use crate::config::{JobConfig, Step};
use crate::options::{Channel, SearchOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Batch regex find and replace across many files.
///
/// `rebatch` loads a set of files, narrows them with a chain of patterns,
/// previews every replacement and writes the accepted ones back atomically.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Batch regex find and replace across many files",
    long_about = "rebatch - narrow a set of files with chained regex searches, preview replacements, then commit them.

Each -e expression narrows the result of the previous one. Prefix an
expression with '!' to keep only files that do NOT match it ('\\!' for a
literal leading '!').

QUICK EXAMPLES:
  rebatch find -R src -e 'unwrap\\(\\)'                  # Every unwrap() under src/
  rebatch find -R . -e 'TODO' -e '!generated'           # TODOs outside generated files
  rebatch replace -R src -e '(\\w+)-(\\w+)' -r '\\2-\\1' --dry-run
  rebatch replace -c job.yaml --exclude 0,3             # Run a job file, skip two edits

For detailed help on any command, use: rebatch <command> --help"
)]
pub struct Args {
    /// Print debug logging to stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(clap::Args, Debug, Clone)]
pub struct SearchArgs {
    /// Files and directories to load.
    pub paths: Vec<PathBuf>,

    /// A search expression. Repeat to narrow further; a leading '!' inverts it.
    #[arg(short = 'e', long = "expr", allow_hyphen_values = true)]
    pub exprs: Vec<String>,

    /// Descend into nested directories.
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Case-insensitive matching.
    #[arg(short, long)]
    pub ignore_case: bool,

    /// '^' and '$' match at line boundaries.
    #[arg(short, long)]
    pub multi_line: bool,

    /// '.' also matches line terminators.
    #[arg(short = 's', long)]
    pub dot_all: bool,

    /// Search file paths instead of file contents.
    #[arg(long = "paths")]
    pub search_paths: bool,

    /// The output format (`text`, `json` or `csv`).
    #[arg(short = 'f', long = "format", default_value = "text")]
    pub format: String,

    /// Path to the output file. If omitted, results are written to standard output.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// A YAML job file. Command-line values extend it.
    #[arg(short, long, env = "REBATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

impl SearchArgs {
    /// The part of a job described on the command line.
    pub fn to_job(&self) -> JobConfig {
        let channel = if self.search_paths {
            Channel::Path
        } else {
            Channel::Content
        };
        JobConfig {
            paths: self.paths.clone(),
            recursive: self.recursive,
            options: SearchOptions::new(channel)
                .with_ignore_case(self.ignore_case)
                .with_multi_line(self.multi_line)
                .with_dot_all(self.dot_all),
            steps: self.exprs.iter().map(|e| Step::parse_expr(e)).collect(),
            replacement: None,
            exclude: Vec::new(),
        }
    }
}

/// The set of available commands for the `rebatch` CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find occurrences and list them
    ///
    /// EXAMPLES:
    ///   rebatch find -R src -e 'foo'                 # Every 'foo' under src/
    ///   rebatch find -R . -e 'foo' -e '!bar'         # Files with foo but without bar
    ///   rebatch find --paths -R . -e '\.rs$'         # Match on file paths
    ///   rebatch find -f json -R . -e 'foo' | jq '.records[]'
    Find {
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Preview and apply replacements
    ///
    /// EXAMPLES:
    ///   rebatch replace -R src -e 'foo' -r 'bar' --dry-run
    ///   rebatch replace -R src -e '(\w+)-(\w+)' -r '\2 \1'
    ///   rebatch replace -c job.yaml --exclude 2
    ///
    /// Job file format (job.yaml):
    ///   paths: [src]
    ///   recursive: true
    ///   options: { ignore_case: true }
    ///   steps:
    ///     - { op: exists, pattern: 'foo' }
    ///     - { op: not_exists, pattern: 'generated' }
    ///   replacement: 'bar'
    ///   exclude: [0, 3]
    ///
    /// Templates use \1..\99, \g<n> and \g<name> for groups and \g<0> for the whole match.
    /// \0 and three-digit octal escapes such as \101 insert character codes.
    Replace {
        #[command(flatten)]
        search: SearchArgs,

        /// The replacement template.
        #[arg(short, long, allow_hyphen_values = true)]
        replacement: Option<String>,

        /// Comma-separated positions of previewed replacements to leave out.
        #[arg(short = 'x', long = "exclude", value_delimiter = ',')]
        exclude: Vec<usize>,

        /// Preview the changes without actually modifying any files.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Parses command-line arguments and returns the populated `Args` struct.
pub fn parse_args() -> Args {
    Args::parse()
}
