//! Saved reviews used to report only new issues on later runs.
//!
//! A baseline is the plain review text of one file, stored as
//! `<dir>/<file name>_baseline.txt`.

use std::path::{Path, PathBuf};

use crate::collector::display_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, source: &Path) -> PathBuf {
        self.dir
            .join(format!("{}_baseline.txt", display_name(source)))
    }

    /// Saved review for `source`, if any. Unreadable baselines are treated as absent.
    pub fn load(&self, source: &Path) -> Option<String> {
        let path = self.path_for(source);
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable baseline, ignoring");
                None
            }
        }
    }

    pub fn save(&self, source: &Path, review: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(source);
        std::fs::write(&path, review)?;
        Ok(path)
    }
}

/// What the pipeline does with baselines during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BaselineMode {
    #[default]
    Off,
    /// Store every successful review.
    Save(BaselineStore),
    /// Ask only for issues missing from the stored review.
    Compare(BaselineStore),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = BaselineStore::new(tmp.path().join("baseline"));
        let saved = store.save(Path::new("sql/q1.sql"), "<table>old</table>").unwrap();

        assert_eq!(saved, tmp.path().join("baseline").join("q1.sql_baseline.txt"));
        assert_eq!(
            store.load(Path::new("other/dir/q1.sql")).as_deref(),
            Some("<table>old</table>")
        );
    }

    #[test]
    fn missing_baseline_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = BaselineStore::new(tmp.path());
        assert_eq!(store.load(Path::new("nothing.sql")), None);
    }
}
