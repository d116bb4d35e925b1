use crate::config::JobConfig;
use crate::errors::{Error, Result};
use crate::extract::extract;
use crate::file_set::FileSet;
use crate::finder::{self, Finder};
use crate::matches::{LineSpan, MatchRecord, Span};
use crate::options::{Channel, LogicalOp};
use crate::output_formatter::{OutputFormat, OutputFormatter};
use crate::template::Template;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Previews and applies replacements for the occurrences a `Finder` found.
///
/// A `Replacer` is previewable until [`Replacer::commit`] consumes it, so a
/// second commit through the same value is impossible. Writing through a
/// different `Replacer` built from the same, now outdated `Finder` fails with
/// [`Error::StaleMatches`].
#[derive(Debug)]
pub struct Replacer<'f> {
    finder: &'f Finder,
    template: Option<Template>,
    records: Vec<MatchRecord>,
    edits: Vec<Edit>,
}

/// One previewed substitution, addressed in the original channel value.
#[derive(Debug, Clone)]
struct Edit {
    finder_record: usize,
    file_index: usize,
    span: Span,
    substitution: String,
}

/// Preview state carried between occurrences on the same line.
struct LineRun {
    file_index: usize,
    line_span: LineSpan,
    candidate: String,
    shift: isize,
}

/// The outcome of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Indices of the files whose content changed.
    pub files: Vec<usize>,
    /// The number of substitutions written.
    pub applied: usize,
    /// The number of previewed substitutions left out.
    pub excluded: usize,
}

impl<'f> Replacer<'f> {
    pub fn new(finder: &'f Finder) -> Self {
        Self {
            finder,
            template: None,
            records: Vec::new(),
            edits: Vec::new(),
        }
    }

    /// Computes the replacement preview for `template`.
    ///
    /// Every call replaces the previous preview. Nothing is previewed for the
    /// path channel, for an empty finder, or for a finder whose last search
    /// was [`LogicalOp::NotExists`].
    pub fn replace(&mut self, files: &FileSet, template: &str) -> Result<()> {
        let template = Template::parse(template)?;
        self.records.clear();
        self.edits.clear();

        let finder = self.finder;
        let channel = finder.options().channel();
        if channel == Channel::Path {
            debug!("path replacement is not supported, nothing previewed");
            self.template = Some(template);
            return Ok(());
        }
        let Some(regex) = finder.regex() else {
            self.template = Some(template);
            return Ok(());
        };
        if finder.is_empty() || finder.logical_op() == Some(LogicalOp::NotExists) {
            self.template = Some(template);
            return Ok(());
        }
        finder.check_revision(files)?;
        template.validate(regex)?;

        let literal = template.literal();
        let mut run: Option<LineRun> = None;

        for (i, record) in finder.matches().iter().enumerate() {
            let Some(occurrence) = &record.occurrence else {
                continue;
            };
            let Some(value) = files.channel_value(channel, record.file_index) else {
                continue;
            };
            let span = occurrence.match_span;
            let matched = &value[span.range()];

            let substitution = match literal {
                Some(text) => text.to_string(),
                None => {
                    let caps = regex
                        .captures_at(value, span.start)
                        .filter(|caps| caps.get(0).map(|m| m.range()) == Some(span.range()))
                        .ok_or_else(|| Error::MatchDrift {
                            path: record.path.clone(),
                            start: span.start,
                            end: span.end,
                        })?;
                    template.expand(&caps)
                }
            };
            if substitution == matched {
                continue;
            }

            // Later occurrences on an already previewed line show the earlier
            // substitutions too.
            let (base, shift) = match run.take() {
                Some(r) if r.file_index == record.file_index && r.line_span == occurrence.line_span => {
                    (r.candidate, r.shift)
                }
                _ => (value.to_string(), 0),
            };
            let start = span.start.saturating_add_signed(shift);
            let mut candidate = String::with_capacity(base.len() + substitution.len());
            candidate.push_str(&base[..start]);
            candidate.push_str(&substitution);
            candidate.push_str(&base[start + span.len()..]);

            let preview = extract(
                &candidate,
                Span::new(start, start + substitution.len()),
                &substitution,
            );
            self.records.push(MatchRecord {
                file_index: record.file_index,
                path: record.path.clone(),
                occurrence: Some(preview),
            });

            run = Some(LineRun {
                file_index: record.file_index,
                line_span: occurrence.line_span,
                candidate,
                shift: shift + substitution.len() as isize - span.len() as isize,
            });
            self.edits.push(Edit {
                finder_record: i,
                file_index: record.file_index,
                span,
                substitution,
            });
        }

        debug!(
            template = template.source(),
            backreferences = template.has_backreferences(),
            previewed = self.records.len(),
            "replace"
        );
        self.template = Some(template);
        Ok(())
    }

    /// Writes the previewed replacements into `files`.
    ///
    /// `excluded` holds positions in [`Replacer::records`] whose original
    /// text is kept. Fails before touching `files` if there is nothing to
    /// commit, if an excluded position does not exist, or if `files` changed
    /// since the finder ran.
    pub fn commit(self, files: &mut FileSet, excluded: &HashSet<usize>) -> Result<Committed> {
        if self.edits.is_empty() {
            return Err(Error::NothingToCommit);
        }
        if let Some(&position) = excluded.iter().find(|&&p| p >= self.edits.len()) {
            return Err(Error::InvalidExclusion {
                position,
                len: self.edits.len(),
            });
        }
        self.finder.check_revision(files)?;

        let mut writes: Vec<(usize, String)> = Vec::new();
        let mut applied = 0;
        let mut position = 0;
        for group in self.edits.chunk_by(|a, b| a.file_index == b.file_index) {
            let file_index = group[0].file_index;
            let original = files
                .channel_value(Channel::Content, file_index)
                .ok_or(Error::IndexOutOfRange {
                    index: file_index,
                    len: files.len(),
                })?;

            let mut assembled = String::with_capacity(original.len());
            let mut cursor = 0;
            for edit in group {
                assembled.push_str(&original[cursor..edit.span.start]);
                if excluded.contains(&position) {
                    assembled.push_str(&original[edit.span.range()]);
                } else {
                    assembled.push_str(&edit.substitution);
                    applied += 1;
                }
                cursor = edit.span.end;
                position += 1;
            }
            assembled.push_str(&original[cursor..]);

            if assembled != original {
                writes.push((file_index, assembled));
            }
        }

        let touched: Vec<usize> = writes.iter().map(|(index, _)| *index).collect();
        for (index, text) in writes {
            files.write_content(index, text)?;
        }
        info!(files = touched.len(), applied, excluded = excluded.len(), "committed");

        Ok(Committed {
            files: touched,
            applied,
            excluded: excluded.len(),
        })
    }

    /// The previewed replacements, in finder order.
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The position in `finder().matches()` a preview record came from.
    pub fn finder_record(&self, position: usize) -> Option<usize> {
        self.edits.get(position).map(|e| e.finder_record)
    }

    /// The text a preview record would write.
    pub fn substitution(&self, position: usize) -> Option<&str> {
        self.edits.get(position).map(|e| e.substitution.as_str())
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_ref().map(Template::source)
    }

    pub fn finder(&self) -> &'f Finder {
        self.finder
    }
}

/// The main entry point for the `replace` command.
///
/// This function orchestrates the entire replacement process:
/// 1. It loads the files and narrows them with every search step.
/// 2. It previews the replacement and writes the preview.
/// 3. Unless `dry_run` is set, it commits the preview, minus the excluded
///    positions, and saves the changed files.
pub fn run_replace(job: &JobConfig, format: OutputFormat, output: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let template = job
        .replacement
        .as_deref()
        .ok_or("Specify --replacement or a replacement in the config file")?;
    let (mut files, found) = finder::prepare(job)?;

    let mut replacer = Replacer::new(&found);
    replacer.replace(&files, template)?;

    let formatter = OutputFormatter::new(format, true);
    let mut writer = finder::open_output(output)?;
    formatter.write_output(&mut writer, replacer.records())?;

    if dry_run || replacer.is_empty() {
        return Ok(());
    }

    let excluded: HashSet<usize> = job.exclude.iter().copied().collect();
    let committed = replacer.commit(&mut files, &excluded)?;
    let failed = files.save();
    for path in &failed {
        eprintln!("Could not save {}", path.display());
    }

    eprintln!("\n{}", "-".repeat(50));
    eprintln!("Files changed : {}", committed.files.len().saturating_sub(failed.len()));
    eprintln!("Total edits   : {}", committed.applied);
    eprintln!("Excluded      : {}", committed.excluded);

    Ok(())
}
