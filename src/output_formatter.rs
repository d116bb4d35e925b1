use crate::errors::Result;
use crate::matches::{MatchRecord, Span};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;

/// Defines the possible output formats for match records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// A simple, human-readable text format.
    Text,
    /// JSON format, suitable for machine processing.
    Json,
    /// Comma-Separated Values format.
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Text,
        }
    }
}

/// Handles the formatting of match records into various output formats.
pub struct OutputFormatter {
    format: OutputFormat,
    include_summary: bool,
    tool_name: String,
    tool_version: String,
}

impl OutputFormatter {
    /// Creates a new `OutputFormatter`.
    ///
    /// # Arguments
    ///
    /// * `format` - The `OutputFormat` to use.
    /// * `include_summary` - Whether to append a summary (only for the `Text` format).
    pub fn new(format: OutputFormat, include_summary: bool) -> Self {
        Self {
            format,
            include_summary,
            tool_name: "rebatch".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Writes the formatted records to a given writer.
    pub fn write_output<W: Write>(&self, writer: &mut W, records: &[MatchRecord]) -> Result<()> {
        let output = match self.format {
            OutputFormat::Text => self.format_text(records),
            OutputFormat::Json => self.format_json(records)?,
            OutputFormat::Csv => self.format_csv(records)?,
        };

        writer.write_all(output.as_bytes())?;

        if self.include_summary && self.format == OutputFormat::Text {
            writer.write_all(self.format_summary(records).as_bytes())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// One line per record: `[position] path:line: content`, the occurrence
    /// in brackets. The position is what `--exclude` takes.
    fn format_text(&self, records: &[MatchRecord]) -> String {
        let mut output = String::new();

        for (position, r) in records.iter().enumerate() {
            match &r.occurrence {
                Some(o) => {
                    let Span { start, end } = o.local_span;
                    output.push_str(&format!(
                        "[{}] {}:{}: {}[{}]{}\n",
                        position,
                        r.path.display(),
                        o.line_span.first,
                        &o.line[..start],
                        &o.line[start..end],
                        &o.line[end..]
                    ));
                }
                None => output.push_str(&format!("[{}] {}\n", position, r.path.display())),
            }
        }

        output
    }

    /// Formats records into a structured JSON document.
    fn format_json(&self, records: &[MatchRecord]) -> Result<String> {
        #[derive(Serialize)]
        struct JsonOutput<'a> {
            tool: ToolInfo<'a>,
            generated_at: DateTime<Utc>,
            total_records: usize,
            records: &'a [MatchRecord],
        }

        #[derive(Serialize)]
        struct ToolInfo<'a> {
            name: &'a str,
            version: &'a str,
        }

        let output = JsonOutput {
            tool: ToolInfo {
                name: &self.tool_name,
                version: &self.tool_version,
            },
            generated_at: Utc::now(),
            total_records: records.len(),
            records,
        };

        Ok(serde_json::to_string_pretty(&output)?)
    }

    /// Formats records into a CSV table. Absent occurrences leave their columns empty.
    fn format_csv(&self, records: &[MatchRecord]) -> Result<String> {
        use csv::Writer;

        let mut wtr = Writer::from_writer(vec![]);

        wtr.write_record(["File", "Line", "LastLine", "Start", "End", "Match", "Content"])?;

        for r in records {
            let path = r.path.display().to_string();
            match &r.occurrence {
                Some(o) => {
                    let first = o.line_span.first.to_string();
                    let last = (o.line_span.end - 1).to_string();
                    let start = o.match_span.start.to_string();
                    let end = o.match_span.end.to_string();
                    wtr.write_record([
                        path.as_str(),
                        first.as_str(),
                        last.as_str(),
                        start.as_str(),
                        end.as_str(),
                        o.matched(),
                        o.line.as_str(),
                    ])?
                }
                None => wtr.write_record([path.as_str(), "", "", "", "", "", ""])?,
            }
        }

        let data = wtr.into_inner().map_err(|e| format!("CSV writer error: {}", e))?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn format_summary(&self, records: &[MatchRecord]) -> String {
        let files: HashSet<usize> = records.iter().map(|r| r.file_index).collect();

        let mut summary = String::new();
        summary.push_str(&format!("\n{} Summary {}\n", "=".repeat(20), "=".repeat(20)));
        summary.push_str(&format!("Total records: {}\n", records.len()));
        summary.push_str(&format!("Files: {}\n", files.len()));
        summary
    }
}
