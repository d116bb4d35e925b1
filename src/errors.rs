use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in `rebatch`.
///
/// I/O and parsing failures are wrapped from their source crates. The
/// remaining variants are ordering violations against the engine's
/// invariants: they are returned before any state is touched.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading a file, walking a directory or writing output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A search pattern did not compile.
    #[error("Pattern compilation failed: {0}")]
    Regex(#[from] regex::Error),

    /// A job file is not valid YAML or does not fit `JobConfig`.
    #[error("Config parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Bad or missing command-line input, or a job file that cannot be found.
    #[error("Config error: {0}")]
    Config(String),

    /// The temporary file holding new content could not replace the original.
    #[error("Tempfile error: {0}")]
    TempFile(#[from] tempfile::PersistError),

    /// Writing CSV output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Files can no longer be removed because some of them were modified.
    #[error("Not permitted when some files have already been modified")]
    AlreadyMutated,

    /// A file index does not exist in the file set.
    #[error("File index {index} out of range (file set holds {len} files)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Match records were computed against an older state of the file set.
    #[error("Match data is stale: computed against file set state {expected}, now at {actual}")]
    StaleMatches { expected: u64, actual: u64 },

    /// `commit` was called without any previewed replacement.
    #[error("Nothing to commit: no replacement has been previewed")]
    NothingToCommit,

    /// An excluded position does not refer to a previewed replacement.
    #[error("Excluded position {position} does not exist ({len} previewed replacements)")]
    InvalidExclusion { position: usize, len: usize },

    /// A recorded occurrence no longer matches the text it was found in.
    #[error("Recorded match {start}..{end} in {path} no longer matches")]
    MatchDrift { path: PathBuf, start: usize, end: usize },

    /// A replacement template is malformed or refers to an unknown group.
    #[error("Invalid replacement template: {0}")]
    InvalidTemplate(String),

    /// A file could not be written back.
    #[error("Saving failed for {path}: {reason}")]
    Save { path: PathBuf, reason: String },
}

/// A convenient type alias for `Result<T, rebatch::errors::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Config(s.to_string())
    }
}
