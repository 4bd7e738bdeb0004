//! Core value types and the text-generation seam.
//!
//! A [`ReviewRequest`] is built once per file, handed to a
//! [`TextGenerator`], and the outcome is recorded as exactly one
//! [`ReviewResult`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, SafetyThreshold};
use crate::error::{Result, ReviewError};

// ── Generation parameters ────────────────────────────────────────

/// Sampling and safety settings for one call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub safety_threshold: SafetyThreshold,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            safety_threshold: config.safety_threshold,
        }
    }
}

// ── Request ──────────────────────────────────────────────────────

/// A rendered prompt for one target file.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub path: PathBuf,
    pub prompt: String,
    pub params: GenerationParams,
}

// ── Outcome / result ─────────────────────────────────────────────

/// Terminal state of one file. Exactly one per file, all three rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Succeeded,
    Blocked,
    Failed,
}

impl ReviewOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The recorded outcome for one file.
///
/// `text` is the model response for [`ReviewOutcome::Succeeded`] and the
/// failure/block reason otherwise. It is never parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    pub path: PathBuf,
    pub elapsed: Duration,
    pub text: String,
    pub outcome: ReviewOutcome,
}

impl ReviewResult {
    pub fn succeeded(path: impl Into<PathBuf>, text: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            path: path.into(),
            elapsed,
            text: text.into(),
            outcome: ReviewOutcome::Succeeded,
        }
    }

    pub fn blocked(path: impl Into<PathBuf>, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            path: path.into(),
            elapsed,
            text: reason.into(),
            outcome: ReviewOutcome::Blocked,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, reason: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            path: path.into(),
            elapsed,
            text: reason.into(),
            outcome: ReviewOutcome::Failed,
        }
    }

    /// Map a generator result onto the three terminal states.
    pub fn from_generation(
        path: impl Into<PathBuf>,
        generated: Result<String>,
        elapsed: Duration,
    ) -> Self {
        match generated {
            Ok(text) => Self::succeeded(path, text, elapsed),
            Err(ReviewError::SafetyBlocked(reason)) => Self::blocked(path, reason, elapsed),
            Err(e) => Self::failed(path, e.to_string(), elapsed),
        }
    }

    pub fn file_name(&self) -> String {
        crate::collector::display_name(&self.path)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ReviewOutcome::Succeeded
    }
}

// ── Text generator trait ─────────────────────────────────────────

/// The one remote capability the pipeline needs.
///
/// Implementations return the full response text, fail with
/// [`ReviewError::SafetyBlocked`] when the provider declines on policy
/// grounds, and with [`ReviewError::Service`] for everything else.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model or backend name, for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &ReviewRequest) -> Result<String>;
}

/// Concatenate streamed fragments in arrival order. The first error wins
/// and any partial text is discarded.
pub async fn collect_fragments<S>(stream: S) -> Result<String>
where
    S: Stream<Item = Result<String>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn generation_maps_to_outcomes() {
        let d = Duration::from_millis(5);
        let ok = ReviewResult::from_generation("a.py", Ok("<table></table>".into()), d);
        assert_eq!(ok.outcome, ReviewOutcome::Succeeded);
        assert_eq!(ok.text, "<table></table>");

        let blocked = ReviewResult::from_generation(
            "b.py",
            Err(ReviewError::SafetyBlocked("SAFETY".into())),
            d,
        );
        assert_eq!(blocked.outcome, ReviewOutcome::Blocked);
        assert_eq!(blocked.text, "SAFETY");

        let failed =
            ReviewResult::from_generation("c.py", Err(ReviewError::Service("quota".into())), d);
        assert_eq!(failed.outcome, ReviewOutcome::Failed);
        assert!(failed.text.contains("quota"));
    }

    #[test]
    fn result_file_name_is_last_component() {
        let r = ReviewResult::succeeded("dir/sub/x.sql", "", Duration::ZERO);
        assert_eq!(r.file_name(), "x.sql");
    }

    #[test]
    fn params_follow_model_config() {
        let config = ModelConfig {
            max_output_tokens: 512,
            temperature: 0.5,
            ..ModelConfig::default()
        };
        let params = GenerationParams::from(&config);
        assert_eq!(params.max_output_tokens, 512);
        assert_eq!(params.temperature, 0.5);
        assert_eq!(params.top_p, 0.95);
    }

    #[tokio::test]
    async fn fragments_concatenate_in_order() {
        let fragments = stream::iter(vec![
            Ok("<table>".to_string()),
            Ok("<tr><td>x</td></tr>".to_string()),
            Ok("</table>".to_string()),
        ]);
        let text = collect_fragments(fragments).await.unwrap();
        assert_eq!(text, "<table><tr><td>x</td></tr></table>");
    }

    #[tokio::test]
    async fn fragment_error_aborts_collection() {
        let fragments = stream::iter(vec![
            Ok("partial".to_string()),
            Err(ReviewError::SafetyBlocked("SAFETY".into())),
            Ok("never".to_string()),
        ]);
        let err = collect_fragments(fragments).await.unwrap_err();
        assert!(matches!(err, ReviewError::SafetyBlocked(_)));
    }
}
