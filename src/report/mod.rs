//! Report assembly.
//!
//! [`Report`] accumulates results in arrival (= discovery) order and is
//! rendered once at the end of a run: [`html`] for file reviews, [`sql`] for
//! spreadsheet-driven INSERT generation.

pub mod html;
pub mod sql;

use crate::review::traits::{ReviewOutcome, ReviewResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    results: Vec<ReviewResult>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ReviewResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[ReviewResult] {
        &self.results
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReviewResult> {
        self.results.iter()
    }

    pub fn count(&self, outcome: ReviewOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// One-line summary for the console.
    pub fn summary(&self) -> String {
        format!(
            "{} file(s): {} reviewed, {} blocked, {} failed",
            self.len(),
            self.count(ReviewOutcome::Succeeded),
            self.count(ReviewOutcome::Blocked),
            self.count(ReviewOutcome::Failed),
        )
    }
}

impl FromIterator<ReviewResult> for Report {
    fn from_iter<T: IntoIterator<Item = ReviewResult>>(iter: T) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counts_and_summary() {
        let report: Report = vec![
            ReviewResult::succeeded("a.py", "ok", Duration::ZERO),
            ReviewResult::blocked("b.py", "SAFETY", Duration::ZERO),
            ReviewResult::failed("c.py", "503", Duration::ZERO),
            ReviewResult::succeeded("d.py", "ok", Duration::ZERO),
        ]
        .into_iter()
        .collect();

        assert_eq!(report.len(), 4);
        assert_eq!(report.count(ReviewOutcome::Succeeded), 2);
        assert_eq!(report.summary(), "4 file(s): 2 reviewed, 1 blocked, 1 failed");
    }
}
