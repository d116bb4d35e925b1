use crate::errors::Result;
use crate::options::{LogicalOp, SearchOptions};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One narrowing step of a search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Step {
    /// Whether files must contain (`exists`) or lack (`not_exists`) the pattern.
    #[serde(default = "default_op")]
    pub op: LogicalOp,
    /// The regex pattern string.
    pub pattern: String,
}

fn default_op() -> LogicalOp {
    LogicalOp::Exists
}

impl Step {
    /// Parses a command-line expression.
    ///
    /// A leading `!` turns the expression into a `not_exists` step; `\!`
    /// stands for a literal leading `!`.
    pub fn parse_expr(expr: &str) -> Self {
        if let Some(rest) = expr.strip_prefix('!') {
            Self {
                op: LogicalOp::NotExists,
                pattern: rest.to_string(),
            }
        } else if let Some(rest) = expr.strip_prefix("\\!") {
            Self {
                op: LogicalOp::Exists,
                pattern: format!("!{rest}"),
            }
        } else {
            Self {
                op: LogicalOp::Exists,
                pattern: expr.to_string(),
            }
        }
    }
}

/// A find or replace job as read from a YAML file.
///
/// Every field is optional in the file; command-line values are merged in
/// with [`JobConfig::merge`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Files and directories to load.
    pub paths: Vec<PathBuf>,
    /// Descend into nested directories.
    pub recursive: bool,
    /// Matching flags and the channel to search.
    pub options: SearchOptions,
    /// Search steps, applied in order. Each narrows the previous one.
    pub steps: Vec<Step>,
    /// The replacement template.
    pub replacement: Option<String>,
    /// Positions of previewed replacements to leave out.
    pub exclude: Vec<usize>,
}

impl JobConfig {
    /// Folds command-line values into a job read from a file.
    ///
    /// Paths, steps and exclusions are appended. Flags are switched on when
    /// either side sets them. A replacement given on the command line wins.
    pub fn merge(mut self, other: JobConfig) -> Self {
        self.paths.extend(other.paths);
        self.steps.extend(other.steps);
        self.exclude.extend(other.exclude);
        self.recursive |= other.recursive;
        if other.replacement.is_some() {
            self.replacement = other.replacement;
        }

        let ours = &self.options;
        let theirs = &other.options;
        let channel = if theirs.channel() != SearchOptions::default().channel() {
            theirs.channel()
        } else {
            ours.channel()
        };
        self.options = SearchOptions::new(channel)
            .with_ignore_case(ours.ignore_case() || theirs.ignore_case())
            .with_multi_line(ours.multi_line() || theirs.multi_line())
            .with_dot_all(ours.dot_all() || theirs.dot_all());
        self
    }
}

/// A utility for locating and loading job files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Finds the configuration file by searching in a prioritized list of locations.
    ///
    /// The search order is:
    /// 1. The path as given, absolute or relative to the current directory.
    /// 2. A path relative to the `working_dir`.
    /// 3. Inside the `~/.rebatch` directory.
    /// 4. Next to the executable.
    /// 5. In the parent directory of the executable (to handle `target/release` builds).
    /// 6. In the grandparent directory of the executable.
    ///
    /// The error lists every location that was tried.
    pub fn find_config(config_path: &Path, working_dir: &Path) -> Result<PathBuf> {
        let candidates = Self::candidates(config_path, working_dir);
        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }

        let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        Err(format!(
            "Config file '{}' not found. Searched in:\n  - {}",
            config_path.display(),
            tried.join("\n  - ")
        )
        .into())
    }

    fn candidates(config_path: &Path, working_dir: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![config_path.to_path_buf()];
        if config_path.is_absolute() {
            return candidates;
        }

        candidates.push(working_dir.join(config_path));

        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".rebatch").join(config_path));
        }

        // Executable directory, then up to two parents for target/release builds
        if let Ok(exe_path) = env::current_exe() {
            let mut dir = exe_path.parent();
            for _ in 0..3 {
                let Some(d) = dir else { break };
                candidates.push(d.join(config_path));
                dir = d.parent();
            }
        }
        candidates
    }

    /// Loads a `JobConfig` from a YAML file.
    pub fn load_job_config(path: &Path) -> Result<JobConfig> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Channel;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_expr() {
        assert_eq!(
            Step::parse_expr("foo"),
            Step { op: LogicalOp::Exists, pattern: "foo".into() }
        );
        assert_eq!(
            Step::parse_expr("!generated"),
            Step { op: LogicalOp::NotExists, pattern: "generated".into() }
        );
        assert_eq!(
            Step::parse_expr(r"\!important"),
            Step { op: LogicalOp::Exists, pattern: "!important".into() }
        );
    }

    #[test]
    fn test_load_job_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.yaml");
        fs::write(
            &path,
            r#"
paths: [src, docs]
recursive: true
options: { channel: content, ignore_case: true }
steps:
  - { op: exists, pattern: 'foo' }
  - { op: not_exists, pattern: 'generated' }
  - pattern: 'bar'
replacement: 'baz'
exclude: [0, 3]
"#,
        )
        .unwrap();

        let job = ConfigLoader::load_job_config(&path).unwrap();
        assert_eq!(job.paths, vec![PathBuf::from("src"), PathBuf::from("docs")]);
        assert!(job.recursive);
        assert!(job.options.ignore_case());
        assert!(!job.options.multi_line());
        assert_eq!(job.steps.len(), 3);
        assert_eq!(job.steps[1].op, LogicalOp::NotExists);
        assert_eq!(job.steps[2].op, LogicalOp::Exists);
        assert_eq!(job.replacement.as_deref(), Some("baz"));
        assert_eq!(job.exclude, vec![0, 3]);
    }

    #[test]
    fn test_empty_job_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.yaml");
        fs::write(&path, "{}").unwrap();

        let job = ConfigLoader::load_job_config(&path).unwrap();
        assert!(job.paths.is_empty());
        assert_eq!(job.options.channel(), Channel::Content);
    }

    #[test]
    fn test_merge() {
        let file = JobConfig {
            paths: vec!["src".into()],
            options: SearchOptions::new(Channel::Content).with_ignore_case(true),
            steps: vec![Step::parse_expr("foo")],
            replacement: Some("a".into()),
            ..Default::default()
        };
        let cli = JobConfig {
            paths: vec!["docs".into()],
            recursive: true,
            options: SearchOptions::new(Channel::Path).with_dot_all(true),
            steps: vec![Step::parse_expr("!bar")],
            replacement: Some("b".into()),
            exclude: vec![1],
        };

        let job = file.merge(cli);
        assert_eq!(job.paths.len(), 2);
        assert_eq!(job.steps.len(), 2);
        assert!(job.recursive);
        assert_eq!(job.options.channel(), Channel::Path);
        assert!(job.options.ignore_case());
        assert!(job.options.dot_all());
        assert_eq!(job.replacement.as_deref(), Some("b"));
        assert_eq!(job.exclude, vec![1]);
    }

    #[test]
    fn test_find_config_in_working_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rebatch-test-job.yaml"), "{}").unwrap();

        let found = ConfigLoader::find_config(Path::new("rebatch-test-job.yaml"), dir.path()).unwrap();
        assert_eq!(found, dir.path().join("rebatch-test-job.yaml"));
    }

    #[test]
    fn test_find_config_reports_locations() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::find_config(Path::new("no-such-job.yaml"), dir.path()).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("no-such-job.yaml"));
        assert!(message.contains(&dir.path().display().to_string()));
    }
}
