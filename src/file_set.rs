use crate::errors::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::options::Channel;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// The content of a tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    /// The file is not valid UTF-8. It stays tracked but is never searched,
    /// replaced or written.
    Binary,
}

impl FileContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Binary => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, FileContent::Binary)
    }
}

/// The result of `FileSet::add_path`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// `false` if the root path is neither a file nor a directory.
    pub found: bool,
    /// Files that were discovered but could not be read.
    pub unreadable: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct TrackedFile {
    path: PathBuf,
    content: FileContent,
    /// `None` for files that were never read from disk.
    fingerprint: Option<Fingerprint>,
    dirty: bool,
}

/// The set of files a session works on.
///
/// `FileSet` is the only owner of file text. Finders and replacers address
/// files by index, read through `&FileSet` and write through `&mut FileSet`.
/// Files are kept sorted by path, so an index is stable until files are
/// added or removed; every such change bumps [`FileSet::layout`]. Every
/// change at all, content writes included, bumps [`FileSet::revision`].
#[derive(Debug, Default, Clone)]
pub struct FileSet {
    files: Vec<TrackedFile>,
    layout: u64,
    revision: u64,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from in-memory entries. Duplicate paths keep the first
    /// entry.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, FileContent)>,
        P: Into<PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut files: Vec<TrackedFile> = entries
            .into_iter()
            .map(|(path, content)| TrackedFile {
                path: path.into(),
                content,
                fingerprint: None,
                dirty: false,
            })
            .filter(|f| seen.insert(f.path.clone()))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            files,
            layout: 0,
            revision: 0,
        }
    }

    /// Adds a file, or the files of a directory, to the set.
    ///
    /// Directories contribute the files on their first level, or every
    /// nested file when `recursive` is set. Already tracked paths are
    /// skipped. Files that are not UTF-8 are tracked as [`FileContent::Binary`];
    /// files that cannot be read are left out and listed in
    /// [`AddOutcome::unreadable`].
    pub fn add_path(&mut self, path: impl AsRef<Path>, recursive: bool) -> AddOutcome {
        let Some(root) = normalize(path.as_ref()) else {
            return AddOutcome::default();
        };
        if !root.is_file() && !root.is_dir() {
            debug!(path = %root.display(), "path not found");
            return AddOutcome::default();
        }

        let mut unreadable = Vec::new();
        let candidates = if root.is_dir() {
            expand_dir(&root, recursive, &mut unreadable)
        } else {
            vec![root]
        };

        let mut known: HashSet<PathBuf> = self.files.iter().map(|f| f.path.clone()).collect();
        let mut added = 0;
        for path in candidates {
            if !known.insert(path.clone()) {
                continue;
            }
            match load(&path) {
                Ok((content, fingerprint)) => {
                    self.files.push(TrackedFile {
                        path,
                        content,
                        fingerprint: Some(fingerprint),
                        dirty: false,
                    });
                    added += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable file");
                    unreadable.push(path);
                }
            }
        }

        if added > 0 {
            self.files.sort_by(|a, b| a.path.cmp(&b.path));
            self.layout += 1;
            self.revision += 1;
        }
        debug!(added, unreadable = unreadable.len(), total = self.files.len(), "paths added");

        AddOutcome {
            found: true,
            unreadable,
        }
    }

    /// Removes the files at `indices`.
    ///
    /// Fails without removing anything if some file has uncommitted changes,
    /// or if an index is out of range.
    pub fn remove(&mut self, indices: &[usize]) -> Result<()> {
        if self.files.iter().any(|f| f.dirty) {
            return Err(Error::AlreadyMutated);
        }
        if let Some(&index) = indices.iter().find(|&&i| i >= self.files.len()) {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }

        let mut indices = indices.to_vec();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        for index in &indices {
            self.files.remove(*index);
        }
        if !indices.is_empty() {
            self.layout += 1;
            self.revision += 1;
        }
        Ok(())
    }

    /// Writes modified files back to disk.
    ///
    /// Only files changed by a commit are written. Returns the paths that
    /// could not be saved; those stay marked as modified.
    pub fn save(&mut self) -> Vec<PathBuf> {
        let mut failed = Vec::new();
        for file in self.files.iter_mut().filter(|f| f.dirty) {
            match write_back(file) {
                Ok(fingerprint) => {
                    debug!(path = %file.path.display(), "saved");
                    file.fingerprint = Some(fingerprint);
                    file.dirty = false;
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "save failed");
                    failed.push(file.path.clone());
                }
            }
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Incremented whenever indices or contents change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Incremented whenever files are added or removed, i.e. whenever an
    /// index may start to refer to a different file.
    pub fn layout(&self) -> u64 {
        self.layout
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.files.get(index).map(|f| f.path.as_path())
    }

    pub fn content(&self, index: usize) -> Option<&FileContent> {
        self.files.get(index).map(|f| &f.content)
    }

    /// Indices of files changed since the last save.
    pub fn dirty_indices(&self) -> Vec<usize> {
        self.files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.dirty)
            .map(|(i, _)| i)
            .collect()
    }

    /// The searchable value of one file on `channel`.
    ///
    /// `None` for binary contents and for paths that are not valid UTF-8.
    pub fn channel_value(&self, channel: Channel, index: usize) -> Option<&str> {
        let file = self.files.get(index)?;
        match channel {
            Channel::Path => file.path.to_str(),
            Channel::Content => file.content.as_text(),
        }
    }

    /// Replaces the text of one file and marks it modified.
    pub(crate) fn write_content(&mut self, index: usize, text: String) -> Result<()> {
        let len = self.files.len();
        let file = self
            .files
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        file.content = FileContent::Text(text);
        file.dirty = true;
        self.revision += 1;
        Ok(())
    }
}

/// Strips trailing separators so a file path is not mistaken for a
/// directory. Returns `None` for an empty path.
fn normalize(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    Some(path.components().collect())
}

fn expand_dir(root: &Path, recursive: bool, unreadable: &mut Vec<PathBuf>) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
    {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_dir() {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                warn!(error = %e, "directory walk failed");
                if let Some(path) = e.path() {
                    unreadable.push(path.to_path_buf());
                }
            }
        }
    }
    files
}

fn load(path: &Path) -> Result<(FileContent, Fingerprint)> {
    let bytes = fs::read(path)?;
    let fingerprint = Fingerprint::of_bytes(&bytes);
    let content = match String::from_utf8(bytes) {
        Ok(text) => FileContent::Text(text),
        Err(_) => FileContent::Binary,
    };
    Ok((content, fingerprint))
}

fn write_back(file: &TrackedFile) -> Result<Fingerprint> {
    let save_error = |reason: &str| Error::Save {
        path: file.path.clone(),
        reason: reason.to_string(),
    };

    let FileContent::Text(text) = &file.content else {
        return Err(save_error("binary content is never written"));
    };
    if !file.path.is_file() {
        return Err(save_error("file no longer exists"));
    }
    if let Some(fingerprint) = &file.fingerprint {
        if !fingerprint.matches_file(&file.path)? {
            return Err(save_error("file changed on disk since it was loaded"));
        }
    }

    // Write atomically using tempfile
    let parent = match file.path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(text.as_bytes())?;

    // Preserve file permissions
    let perms = fs::metadata(&file.path)?.permissions();
    fs::set_permissions(temp_file.path(), perms)?;

    temp_file.persist(&file.path)?;
    Ok(Fingerprint::of_bytes(text.as_bytes()))
}
