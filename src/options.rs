use crate::errors::Result;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Which value of a tracked file a search or replacement operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The file's path string.
    Path,
    /// The file's text content.
    #[default]
    Content,
}

/// The logical test a `Finder::find` call applies to each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    /// Keep files where the pattern occurs, one record per occurrence.
    Exists,
    /// Keep files where the pattern does not occur, one empty record each.
    NotExists,
}

/// Matching flags and the channel to search.
///
/// Built once and shared read-only between a `Finder` and every `Replacer`
/// derived from it. The builder methods consume `self`, so there is no way
/// to change a value that has already been handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    channel: Channel,
    ignore_case: bool,
    multi_line: bool,
    dot_all: bool,
}

impl SearchOptions {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    pub fn with_ignore_case(mut self, yes: bool) -> Self {
        self.ignore_case = yes;
        self
    }

    /// `^` and `$` match at line boundaries.
    pub fn with_multi_line(mut self, yes: bool) -> Self {
        self.multi_line = yes;
        self
    }

    /// `.` also matches line terminators.
    pub fn with_dot_all(mut self, yes: bool) -> Self {
        self.dot_all = yes;
        self
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn multi_line(&self) -> bool {
        self.multi_line
    }

    pub fn dot_all(&self) -> bool {
        self.dot_all
    }

    /// Compiles `pattern` with the configured flags.
    pub fn compile(&self, pattern: &str) -> Result<Regex> {
        Ok(RegexBuilder::new(pattern)
            .case_insensitive(self.ignore_case)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_all)
            .build()?)
    }
}
