//! `rebatch` is a library for batch regex find and replace across many files.
//!
//! It provides the engine behind the `rebatch` command-line tool but can also
//! drive an interactive front end. The main components are:
//!
//! - `FileSet`: the tracked files and their contents. It is the only owner of
//!   text; everything else refers to files by index.
//! - `Finder`: runs a pattern over one channel (path or content) of the files
//!   still in play. Each `find` returns a narrower `Finder`.
//! - `Replacer`: previews a replacement template for every occurrence a
//!   `Finder` found, then commits the accepted ones into the `FileSet`.
//! - `config`: YAML job files for the command-line tool.
//! - `output_formatter`: text, JSON and CSV rendering of match records.
//!
//! Nothing is written to disk until `FileSet::save`, which replaces each
//! changed file atomically and refuses to clobber files changed on disk in
//! the meantime.
//!
//! ```no_run
//! use rebatch::{Channel, FileSet, Finder, LogicalOp, Replacer, SearchOptions};
//! use std::collections::HashSet;
//! use std::sync::Arc;
//!
//! # fn main() -> rebatch::Result<()> {
//! let mut files = FileSet::new();
//! files.add_path("src", true);
//!
//! let options = Arc::new(SearchOptions::new(Channel::Content));
//! let found = Finder::new(&files, options).find(&files, LogicalOp::Exists, r"(\w+)-(\w+)")?;
//!
//! let mut replacer = Replacer::new(&found);
//! replacer.replace(&files, r"\2-\1")?;
//! replacer.commit(&mut files, &HashSet::new())?;
//! let failed = files.save();
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod extract;
pub mod file_set;
pub mod finder;
pub mod fingerprint;
pub mod matches;
pub mod options;
pub mod output_formatter;
pub mod replacer;
pub mod template;

// Re-export main types for easier access by library users.
pub use errors::{Error, Result};
pub use file_set::{AddOutcome, FileContent, FileSet};
pub use finder::Finder;
pub use matches::{LineSpan, MatchRecord, Occurrence, Span};
pub use options::{Channel, LogicalOp, SearchOptions};
pub use output_formatter::{OutputFormat, OutputFormatter};
pub use replacer::{Committed, Replacer};
pub use template::Template;
