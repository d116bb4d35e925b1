use crate::config::JobConfig;
use crate::errors::{Error, Result};
use crate::extract::extract;
use crate::file_set::FileSet;
use crate::matches::{MatchRecord, Occurrence, Span};
use crate::options::{LogicalOp, SearchOptions};
use crate::output_formatter::{OutputFormat, OutputFormatter};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Narrows a `FileSet` down to the files matching a sequence of patterns.
///
/// A `Finder` is a value: [`Finder::find`] leaves `self` untouched and
/// returns a new `Finder` whose working set is the subset of files that
/// passed. Chaining calls therefore combines patterns with a logical AND,
/// and a working set can only shrink.
///
/// The working set is kept parallel to the match records: a file with three
/// occurrences appears three times.
#[derive(Debug, Clone)]
pub struct Finder {
    options: Arc<SearchOptions>,
    layout: u64,
    revision: u64,
    working_set: Vec<usize>,
    logical_op: Option<LogicalOp>,
    pattern: Option<String>,
    regex: Option<Regex>,
    matches: Vec<MatchRecord>,
}

impl Finder {
    /// A finder over every file in `files`.
    pub fn new(files: &FileSet, options: Arc<SearchOptions>) -> Self {
        Self {
            options,
            layout: files.layout(),
            revision: files.revision(),
            working_set: (0..files.len()).collect(),
            logical_op: None,
            pattern: None,
            regex: None,
            matches: Vec::new(),
        }
    }

    /// A finder that continues from the files `previous` found.
    ///
    /// If `previous` found nothing, the new finder covers every file.
    /// Commits since `previous` ran do not matter; adding or removing files
    /// makes the next `find` fail with [`Error::StaleMatches`].
    pub fn from_previous(files: &FileSet, previous: &Finder, options: Arc<SearchOptions>) -> Self {
        let mut finder = Self::new(files, options);
        if !previous.working_set.is_empty() {
            finder.working_set = previous.result_indices();
            finder.layout = previous.layout;
        }
        finder
    }

    /// Searches the working set for `pattern`.
    ///
    /// With [`LogicalOp::Exists`] every occurrence yields a record. With
    /// [`LogicalOp::NotExists`] each file without an occurrence yields one
    /// record without an occurrence. Binary files never match. An empty
    /// pattern returns an unchanged copy.
    pub fn find(&self, files: &FileSet, op: LogicalOp, pattern: &str) -> Result<Finder> {
        if pattern.is_empty() {
            return Ok(self.clone());
        }
        self.check_layout(files)?;
        let regex = self.options.compile(pattern)?;
        let channel = self.options.channel();

        let mut snapshot = self.working_set.clone();
        snapshot.dedup();

        let mut next = Finder {
            options: Arc::clone(&self.options),
            layout: self.layout,
            revision: files.revision(),
            working_set: Vec::new(),
            logical_op: Some(op),
            pattern: Some(pattern.to_string()),
            regex: None,
            matches: Vec::new(),
        };
        let mut seen = HashSet::new();

        for index in snapshot {
            let path = files
                .path(index)
                .map(PathBuf::from)
                .ok_or(Error::IndexOutOfRange {
                    index,
                    len: files.len(),
                })?;
            let value = files.channel_value(channel, index);

            match op {
                LogicalOp::Exists => {
                    let Some(value) = value else { continue };
                    for m in regex.find_iter(value) {
                        let occurrence = extract(value, Span::from(m.range()), m.as_str());
                        next.record(&mut seen, index, path.clone(), Some(occurrence));
                    }
                }
                LogicalOp::NotExists => {
                    if !value.is_some_and(|v| regex.is_match(v)) {
                        next.record(&mut seen, index, path, None);
                    }
                }
            }
        }

        debug!(
            pattern,
            op = ?op,
            searched = self.working_set.len(),
            records = next.matches.len(),
            "find"
        );
        next.regex = Some(regex);
        Ok(next)
    }

    fn record(
        &mut self,
        seen: &mut HashSet<(usize, Option<Span>)>,
        index: usize,
        path: PathBuf,
        occurrence: Option<Occurrence>,
    ) {
        if !seen.insert((index, occurrence.as_ref().map(|o| o.match_span))) {
            return;
        }
        self.working_set.push(index);
        self.matches.push(MatchRecord {
            file_index: index,
            path,
            occurrence,
        });
    }

    /// The working set holds indices, so a search only needs the files to
    /// sit where they did; the content is read afresh.
    fn check_layout(&self, files: &FileSet) -> Result<()> {
        if files.layout() != self.layout {
            return Err(Error::StaleMatches {
                expected: self.layout,
                actual: files.layout(),
            });
        }
        Ok(())
    }

    /// Match records carry offsets into the content, so they are only usable
    /// while nothing at all has changed.
    pub(crate) fn check_revision(&self, files: &FileSet) -> Result<()> {
        if files.revision() != self.revision {
            return Err(Error::StaleMatches {
                expected: self.revision,
                actual: files.revision(),
            });
        }
        Ok(())
    }

    pub(crate) fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The file indices the next search will visit, one entry per record.
    pub fn working_set(&self) -> &[usize] {
        &self.working_set
    }

    /// The distinct file indices that passed, in ascending order.
    pub fn result_indices(&self) -> Vec<usize> {
        let mut indices = self.working_set.clone();
        indices.dedup();
        indices
    }

    pub fn logical_op(&self) -> Option<LogicalOp> {
        self.logical_op
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn options(&self) -> &Arc<SearchOptions> {
        &self.options
    }
}

/// Loads the job's paths and runs every search step.
///
/// Missing roots and unreadable files are reported on stderr; the job goes on
/// with whatever could be loaded.
pub(crate) fn prepare(job: &JobConfig) -> Result<(FileSet, Finder)> {
    if job.paths.is_empty() {
        return Err("No input paths given".into());
    }
    if job.steps.is_empty() {
        return Err("Specify at least one expression with -e or steps in the config file".into());
    }

    let mut files = FileSet::new();
    for path in &job.paths {
        let outcome = files.add_path(path, job.recursive);
        if !outcome.found {
            eprintln!("Path not found: {}", path.display());
        }
        for unreadable in &outcome.unreadable {
            eprintln!("Could not read {}", unreadable.display());
        }
    }

    let mut finder = Finder::new(&files, Arc::new(job.options.clone()));
    for step in &job.steps {
        finder = finder.find(&files, step.op, &step.pattern)?;
    }
    Ok((files, finder))
}

/// Opens the output file, or standard output when none is given.
pub(crate) fn open_output(output: Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    })
}

/// The main entry point for the `find` command.
pub fn run_find(job: &JobConfig, format: OutputFormat, output: Option<PathBuf>) -> Result<()> {
    let (_files, found) = prepare(job)?;

    let formatter = OutputFormatter::new(format, true);
    let mut writer = open_output(output)?;
    formatter.write_output(&mut writer, found.matches())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_set::FileContent;
    use crate::matches::LineSpan;
    use crate::options::Channel;

    fn file_set(contents: &[&str]) -> FileSet {
        FileSet::from_entries(
            contents
                .iter()
                .enumerate()
                .map(|(i, c)| (format!("path{}", i + 1), FileContent::Text(c.to_string()))),
        )
    }

    fn content_finder(files: &FileSet) -> Finder {
        Finder::new(files, Arc::new(SearchOptions::new(Channel::Content)))
    }

    fn lines(finder: &Finder) -> Vec<Option<&str>> {
        finder.matches().iter().map(|m| m.line()).collect()
    }

    fn paths(finder: &Finder) -> Vec<String> {
        finder
            .matches()
            .iter()
            .map(|m| m.path.display().to_string())
            .collect()
    }

    #[test]
    fn test_find_path() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let finder = Finder::new(&files, Arc::new(SearchOptions::new(Channel::Path)));
        let found = finder.find(&files, LogicalOp::Exists, "path").unwrap();

        assert_eq!(lines(&found), vec![Some("path1"), Some("path2"), Some("path3")]);
        assert_eq!(paths(&found), vec!["path1", "path2", "path3"]);
    }

    #[test]
    fn test_find_content() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();

        assert_eq!(lines(&found), vec![Some("foo"), Some("foo bar")]);
        assert_eq!(paths(&found), vec!["path1", "path3"]);
        assert_eq!(found.working_set(), &[0, 2]);
        assert_eq!(found.logical_op(), Some(LogicalOp::Exists));
        assert_eq!(found.pattern(), Some("foo"));
    }

    #[test]
    fn test_find_not_exists() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let found = content_finder(&files).find(&files, LogicalOp::NotExists, "bar").unwrap();

        assert_eq!(found.matches().len(), 1);
        assert!(found.matches()[0].is_null());
        assert_eq!(found.matches()[0].line_span(), None);
        assert_eq!(found.matches()[0].match_span(), None);
        assert_eq!(paths(&found), vec!["path1"]);
    }

    #[test]
    fn test_exists_and_not_exists_are_complementary() {
        let files = file_set(&["foo", "bar", "foo bar foo"]);
        let finder = content_finder(&files);
        let exists = finder.find(&files, LogicalOp::Exists, "foo").unwrap();
        let not_exists = finder.find(&files, LogicalOp::NotExists, "foo").unwrap();

        for index in 0..files.len() {
            let hits = exists.matches().iter().filter(|m| m.file_index == index).count();
            let nulls: Vec<_> = not_exists.matches().iter().filter(|m| m.file_index == index).collect();
            assert!((hits >= 1) != (nulls.len() == 1 && nulls[0].is_null()));
        }
    }

    #[test]
    fn test_one_record_per_occurrence() {
        let files = file_set(&["foo bar foo"]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();

        assert_eq!(lines(&found), vec![Some("foo bar foo"), Some("foo bar foo")]);
        assert_eq!(found.working_set(), &[0, 0]);
        assert_eq!(found.result_indices(), vec![0]);
        let spans: Vec<_> = found.matches().iter().map(|m| m.match_span().unwrap()).collect();
        assert_eq!(spans, vec![Span::new(0, 3), Span::new(8, 11)]);
    }

    #[test]
    fn test_repeated_find_narrows() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let first = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();
        let second = first.find(&files, LogicalOp::Exists, "bar").unwrap();

        assert_eq!(lines(&second), vec![Some("foo bar")]);
        assert_eq!(paths(&second), vec!["path3"]);
        assert!(second.result_indices().iter().all(|i| first.result_indices().contains(i)));
        // The first finder is untouched
        assert_eq!(first.matches().len(), 2);
    }

    #[test]
    fn test_repeated_find_keeps_all_occurrences() {
        let files = file_set(&["foo bar foo", "bar", "baz"]);
        let found = content_finder(&files)
            .find(&files, LogicalOp::Exists, "bar")
            .unwrap()
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap();

        assert_eq!(lines(&found), vec![Some("foo bar foo"), Some("foo bar foo")]);
        assert_eq!(paths(&found), vec!["path1", "path1"]);
    }

    #[test]
    fn test_not_exists_chains() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let finder = content_finder(&files);

        let both = finder
            .find(&files, LogicalOp::NotExists, "foo")
            .unwrap()
            .find(&files, LogicalOp::NotExists, "bar")
            .unwrap();
        assert!(both.is_empty());

        let then_exists = finder
            .find(&files, LogicalOp::NotExists, "foo")
            .unwrap()
            .find(&files, LogicalOp::Exists, "bar")
            .unwrap();
        assert_eq!(lines(&then_exists), vec![Some("bar")]);
        assert_eq!(paths(&then_exists), vec!["path2"]);

        let exists_then_not = finder
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap()
            .find(&files, LogicalOp::NotExists, "bar")
            .unwrap();
        assert_eq!(lines(&exists_then_not), vec![None::<&str>]);
        assert_eq!(paths(&exists_then_not), vec!["path1"]);
    }

    #[test]
    fn test_from_previous() {
        let files = file_set(&["foobar", "bar", "foo bar"]);
        let options = Arc::new(SearchOptions::new(Channel::Content));
        let first = Finder::new(&files, Arc::clone(&options))
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap();

        let second = Finder::from_previous(&files, &first, Arc::clone(&options))
            .find(&files, LogicalOp::Exists, "bar")
            .unwrap()
            .find(&files, LogicalOp::Exists, "foobar")
            .unwrap();
        assert_eq!(lines(&second), vec![Some("foobar")]);
        assert_eq!(paths(&second), vec!["path1"]);
    }

    #[test]
    fn test_from_empty_previous_covers_everything() {
        let files = file_set(&["foo", "bar"]);
        let options = Arc::new(SearchOptions::new(Channel::Content));
        let nothing = Finder::new(&files, Arc::clone(&options))
            .find(&files, LogicalOp::Exists, "baz")
            .unwrap();

        let finder = Finder::from_previous(&files, &nothing, options);
        assert_eq!(finder.working_set(), &[0, 1]);
    }

    #[test]
    fn test_no_match_stays_empty() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let found = content_finder(&files)
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap()
            .find(&files, LogicalOp::Exists, "baz")
            .unwrap()
            .find(&files, LogicalOp::Exists, "bar")
            .unwrap();
        assert!(found.is_empty());
        assert!(found.working_set().is_empty());
    }

    #[test]
    fn test_binary_is_skipped() {
        let files = FileSet::from_entries([
            ("path1", FileContent::Binary),
            ("path2", FileContent::Text("foo".into())),
        ]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();
        assert_eq!(paths(&found), vec!["path2"]);
    }

    #[test]
    fn test_empty_pattern_is_a_no_op() {
        let files = file_set(&["foo", "bar", "foo bar"]);
        let finder = content_finder(&files);
        let found = finder.find(&files, LogicalOp::Exists, "").unwrap();

        assert!(found.is_empty());
        assert_eq!(found.working_set(), finder.working_set());
        assert_eq!(found.pattern(), None);
    }

    #[test]
    fn test_anchored_pattern() {
        let files = file_set(&["foo 123 bar", "bar", "foo bar"]);
        let found = content_finder(&files)
            .find(&files, LogicalOp::Exists, r"^\w+ (.*) \w+$")
            .unwrap();
        assert_eq!(lines(&found), vec![Some("foo 123 bar")]);
    }

    #[test]
    fn test_lines_with_terminators() {
        let files = file_set(&["foo\nbar", "bar\nfoo\nbar", "bar\nfoo\n"]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();
        assert_eq!(lines(&found), vec![Some("foo"), Some("foo"), Some("foo")]);

        let files = file_set(&["foo\nbar"]);
        let finder = content_finder(&files);
        let straddling = finder.find(&files, LogicalOp::Exists, "o\nb").unwrap();
        assert_eq!(lines(&straddling), vec![Some("foo\nbar")]);
        let trailing = finder.find(&files, LogicalOp::Exists, "\n").unwrap();
        assert_eq!(lines(&trailing), vec![Some("foo\n")]);
    }

    #[test]
    fn test_line_spans() {
        let files = file_set(&["bar", "foo\nbar"]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "bar").unwrap();
        let spans: Vec<_> = found.matches().iter().map(|m| m.line_span().unwrap()).collect();
        assert_eq!(spans, vec![LineSpan::new(1, 2), LineSpan::new(2, 3)]);

        let files = file_set(&["foo bar\nbaz\nfoo"]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();
        let spans: Vec<_> = found.matches().iter().map(|m| m.line_span().unwrap()).collect();
        assert_eq!(spans, vec![LineSpan::new(1, 2), LineSpan::new(3, 4)]);
    }

    #[test]
    fn test_match_spans() {
        let files = file_set(&["foo", "bar foo bar", "bar\nfoo\nbar"]);
        let found = content_finder(&files).find(&files, LogicalOp::Exists, "foo").unwrap();
        let spans: Vec<_> = found.matches().iter().map(|m| m.match_span().unwrap()).collect();
        assert_eq!(spans, vec![Span::new(0, 3), Span::new(4, 7), Span::new(4, 7)]);
        let local: Vec<_> = found.matches().iter().map(|m| m.local_span().unwrap()).collect();
        assert_eq!(local, vec![Span::new(0, 3), Span::new(4, 7), Span::new(0, 3)]);
    }

    #[test]
    fn test_ignore_case_option() {
        let files = file_set(&["FOO", "bar"]);
        let options = Arc::new(SearchOptions::new(Channel::Content).with_ignore_case(true));
        let found = Finder::new(&files, options)
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap();
        assert_eq!(lines(&found), vec![Some("FOO")]);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let files = file_set(&["foo"]);
        let err = content_finder(&files)
            .find(&files, LogicalOp::Exists, "(foo")
            .unwrap_err();
        assert!(matches!(err, Error::Regex(_)));
    }

    #[test]
    fn test_from_previous_after_commit() {
        use crate::replacer::Replacer;
        use std::collections::HashSet;

        let mut files = file_set(&["foo one", "bar", "foo two"]);
        let options = Arc::new(SearchOptions::new(Channel::Content));
        let found = Finder::new(&files, Arc::clone(&options))
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap();
        let mut replacer = Replacer::new(&found);
        replacer.replace(&files, "baz").unwrap();
        replacer.commit(&mut files, &HashSet::new()).unwrap();

        let next = Finder::from_previous(&files, &found, Arc::clone(&options))
            .find(&files, LogicalOp::Exists, "one")
            .unwrap();
        assert_eq!(lines(&next), vec![Some("baz one")]);
        assert_eq!(paths(&next), vec!["path1"]);

        // The fresh records can be replaced again
        let mut replacer = Replacer::new(&next);
        replacer.replace(&files, "1").unwrap();
        replacer.commit(&mut files, &HashSet::new()).unwrap();
        assert_eq!(files.channel_value(Channel::Content, 0), Some("baz 1"));
    }

    #[test]
    fn test_from_previous_after_layout_change_is_stale() {
        let mut files = file_set(&["foo", "bar", "foo bar"]);
        let options = Arc::new(SearchOptions::new(Channel::Content));
        let found = Finder::new(&files, Arc::clone(&options))
            .find(&files, LogicalOp::Exists, "foo")
            .unwrap();
        files.remove(&[1]).unwrap();

        let err = Finder::from_previous(&files, &found, options)
            .find(&files, LogicalOp::Exists, "bar")
            .unwrap_err();
        assert!(matches!(err, Error::StaleMatches { .. }));
    }

    #[test]
    fn test_run_find() {
        use crate::config::{JobConfig, Step};
        use std::fs;
        use tempfile::TempDir;

        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(input.path().join("a.txt"), "foo bar").unwrap();
        fs::write(input.path().join("b.txt"), "foo").unwrap();
        fs::write(input.path().join("c.txt"), "bar").unwrap();

        let job = JobConfig {
            paths: vec![input.path().to_path_buf()],
            steps: vec![Step::parse_expr("foo"), Step::parse_expr("!bar")],
            ..JobConfig::default()
        };
        let report = out.path().join("found.csv");
        run_find(&job, OutputFormat::Csv, Some(report.clone())).unwrap();

        let mut rdr = csv::Reader::from_path(report).unwrap();
        let rows: Vec<_> = rdr.records().collect::<std::result::Result<Vec<_>, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get(0).unwrap().ends_with("b.txt"));
    }

    #[test]
    fn test_run_find_needs_steps() {
        use crate::config::JobConfig;

        let job = JobConfig {
            paths: vec![PathBuf::from(".")],
            ..JobConfig::default()
        };
        assert!(matches!(run_find(&job, OutputFormat::Text, None), Err(Error::Config(_))));
    }

    #[test]
    fn test_stale_finder_is_rejected() {
        let mut files = file_set(&["foo", "bar"]);
        let finder = content_finder(&files);
        files.remove(&[0]).unwrap();

        let err = finder.find(&files, LogicalOp::Exists, "bar").unwrap_err();
        assert!(matches!(err, Error::StaleMatches { .. }));
    }
}
