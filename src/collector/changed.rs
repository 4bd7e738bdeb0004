//! Changed-file allow-list.
//!
//! Entries come from `git diff --name-only --relative <range>` run inside the
//! collector root, so git entries are relative to that root even when it is a
//! subdirectory of the repository. List files may be written relative to the
//! root or to the working directory; [`ChangedFiles::contains`] tries the path
//! as given, relative to the collector root, and relative to the working
//! directory.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ReviewError};

/// Default range compared by `--changed-from-git`.
pub const DEFAULT_GIT_RANGE: &str = "HEAD^..HEAD";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFiles {
    entries: HashSet<PathBuf>,
}

impl ChangedFiles {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            entries: paths
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        }
    }

    /// Parse list text: one path per line, blank lines and `#` comments ignored.
    pub fn parse_list(text: &str) -> Self {
        Self::from_paths(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    pub fn from_list_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReviewError::Config(format!("cannot read changed-file list {}: {e}", path.display()))
        })?;
        Ok(Self::parse_list(&text))
    }

    /// Run `git diff --name-only --relative <range>` inside `repo`. Entries
    /// are relative to `repo`; changes outside it are not listed.
    pub async fn from_git(repo: &Path, range: &str) -> Result<Self> {
        let output = tokio::process::Command::new("git")
            .arg("diff")
            .arg("--name-only")
            .arg("--relative")
            .arg(range)
            .current_dir(repo)
            .output()
            .await
            .map_err(|e| ReviewError::Config(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReviewError::Config(format!(
                "git diff --name-only --relative {range} failed: {}",
                stderr.trim()
            )));
        }

        let changed = Self::parse_list(&String::from_utf8_lossy(&output.stdout));
        tracing::info!(range, files = changed.len(), "loaded changed files from git");
        Ok(changed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path`, found under `root`, is on the list.
    pub fn contains(&self, root: &Path, path: &Path) -> bool {
        if self.entries.contains(&normalize(path)) {
            return true;
        }
        if let Ok(rel) = path.strip_prefix(root) {
            if self.entries.contains(&normalize(rel)) {
                return true;
            }
        }
        std::env::current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(cwd).ok().map(normalize))
            .map(|rel| self.entries.contains(&rel))
            .unwrap_or(false)
    }
}

/// Drop `.` components so `./a/b.py` and `a/b.py` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
