//! Source file discovery.
//!
//! [`FileCollector`] walks a root directory (flat or recursive) and yields
//! [`SourceFile`] values lazily, in file-name order, so two runs over the
//! same tree see the same sequence. Unreadable files are logged and skipped;
//! only a missing root is fatal.

pub mod changed;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, ReviewError};

pub use changed::ChangedFiles;

// ── File kind ────────────────────────────────────────────────────

/// Language/format of a discovered file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Python,
    Sql,
    Spreadsheet,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "py" => Self::Python,
            "sql" => Self::Sql,
            "xlsx" | "xls" => Self::Spreadsheet,
            _ => Self::Other,
        }
    }

    /// Human-readable language label used in prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::Sql => "SQL",
            Self::Spreadsheet => "Spreadsheet",
            Self::Other => "source",
        }
    }
}

// ── Source file ──────────────────────────────────────────────────

/// A discovered file and its raw content. Never mutated after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
    pub kind: FileKind,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let path = path.into();
        let kind = FileKind::from_path(&path);
        Self {
            path,
            content: content.into(),
            kind,
        }
    }

    /// Final path component, or the full path when there is none.
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Collector ────────────────────────────────────────────────────

/// Which files under the root are candidates.
#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    /// Accepted extensions, case-insensitive, with or without a leading dot.
    pub extensions: Vec<String>,
    /// Descend into subdirectories (hidden ones are never entered).
    pub recursive: bool,
    /// Restrict to these files, e.g. the output of `git diff --name-only`.
    pub changed: Option<ChangedFiles>,
}

impl CollectorOptions {
    pub fn new<I, S>(extensions: I, recursive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            recursive,
            changed: None,
        }
    }

    pub fn with_changed(mut self, changed: ChangedFiles) -> Self {
        self.changed = Some(changed);
        self
    }
}

pub struct FileCollector {
    root: PathBuf,
    options: CollectorOptions,
}

impl FileCollector {
    /// Fails with [`ReviewError::NotFound`] when `root` is missing or not a directory.
    pub fn new(root: impl Into<PathBuf>, options: CollectorOptions) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ReviewError::NotFound { path: root });
        }
        Ok(Self { root, options })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.options.extensions.iter().any(|want| *want == e)
            })
            .unwrap_or(false);
        if !ext_ok {
            return false;
        }
        match &self.options.changed {
            Some(changed) => {
                let hit = changed.contains(&self.root, path);
                if !hit {
                    tracing::debug!(path = %path.display(), "not in changed files, skipping");
                }
                hit
            }
            None => true,
        }
    }

    /// Matching paths in discovery order, without reading them.
    pub fn paths(self) -> impl Iterator<Item = PathBuf> {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(is_visible as fn(&DirEntry) -> bool)
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(DirEntry::into_path)
            .filter(move |path| self.accepts(path))
    }

    /// Matching files with their content, in discovery order.
    ///
    /// The sequence is lazy and single-pass: each file is read when the
    /// consumer asks for it. Files that cannot be read as UTF-8 text are
    /// logged and skipped.
    pub fn into_files(self) -> impl Iterator<Item = SourceFile> {
        self.paths().filter_map(|path| match read_source(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(error = %e, "skipping file");
                None
            }
        })
    }
}

fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Read one file as UTF-8 text.
pub fn read_source(path: &Path) -> Result<SourceFile> {
    let content = std::fs::read_to_string(path).map_err(|e| ReviewError::read(path, e))?;
    Ok(SourceFile::new(path, content))
}
