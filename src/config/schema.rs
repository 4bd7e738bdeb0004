//! Configuration schema.
//!
//! Every section carries `#[serde(default)]` so a partial (or absent)
//! `config.toml` still yields a complete [`Config`].

use serde::{Deserialize, Serialize};

use crate::review::prompt::CategorySpec;

/// Default Generative Language API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-001";

/// Environment variable consulted when `model.api_key` is unset.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

// ── Root ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub collector: CollectorConfig,
    pub report: ReportConfig,
    pub review: ReviewConfig,
    pub sql: SqlConfig,
}

// ── Model ────────────────────────────────────────────────────────

/// Content-safety threshold sent with every request.
///
/// `Off` omits `safetySettings` entirely and leaves the provider defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyThreshold {
    Off,
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl SafetyThreshold {
    /// Wire value for `safetySettings[].threshold`, `None` when disabled.
    pub fn as_api_str(self) -> Option<&'static str> {
        match self {
            Self::Off => None,
            Self::BlockNone => Some("BLOCK_NONE"),
            Self::BlockOnlyHigh => Some("BLOCK_ONLY_HIGH"),
            Self::BlockMediumAndAbove => Some("BLOCK_MEDIUM_AND_ABOVE"),
            Self::BlockLowAndAbove => Some("BLOCK_LOW_AND_ABOVE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// API base URL (overridable for proxies and tests).
    pub base_url: String,
    /// Model name, e.g. "gemini-1.5-flash-001".
    pub model: String,
    /// Inline API key. Prefer `api_key_env`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub safety_threshold: SafetyThreshold,
    /// Use `streamGenerateContent` (SSE) instead of `generateContent`.
    pub stream: bool,
    /// Per-file call timeout.
    pub request_timeout_secs: u64,
    /// Overall run budget; files not reached in time are recorded as failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.into(),
            max_output_tokens: 8192,
            temperature: 0.2,
            top_p: 0.95,
            safety_threshold: SafetyThreshold::BlockOnlyHigh,
            stream: false,
            request_timeout_secs: 120,
            run_timeout_secs: None,
        }
    }
}

impl ModelConfig {
    /// Inline key first, then the configured environment variable.
    /// Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

// ── Collector ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Extensions to review, without the leading dot.
    pub extensions: Vec<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".into(), "sql".into()],
            recursive: true,
        }
    }
}

// ── Report ───────────────────────────────────────────────────────

/// How reports are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace `output` with a fresh report.
    #[default]
    Recreate,
    /// Add sections to an existing `output` report.
    Append,
    /// One `<stem>_review.html` next to every reviewed file; `output` is unused.
    PerFile,
}

/// How model output is placed into the HTML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BodyRendering {
    /// Rendered as HTML inside a sandboxed iframe (`srcdoc`).
    #[default]
    Sandboxed,
    /// Shown verbatim in a `<pre>` block.
    Escaped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub output: String,
    pub title: String,
    pub write_mode: WriteMode,
    pub body: BodyRendering,
    /// Render per-file elapsed time. Off by default so reruns are byte-identical.
    pub show_timings: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: "code_review_report.html".into(),
            title: "Code Review Report".into(),
            write_mode: WriteMode::Recreate,
            body: BodyRendering::Sandboxed,
            show_timings: false,
        }
    }
}

// ── Review prompt ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Add a Criticality (Low/Medium/High) column to every table.
    pub include_criticality: bool,
    /// File listing accepted issues, one per line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_file: Option<String>,
    /// Replaces the built-in category list when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategorySpec>>,
    /// Where `--save-baseline` / `--compare-baseline` keep earlier reviews.
    pub baseline_dir: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            include_criticality: true,
            ignore_file: None,
            categories: None,
            baseline_dir: "baseline".into(),
        }
    }
}

// ── SQL generation ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SqlConfig {
    pub out_dir: String,
    /// Output file is `<workbook stem>_<suffix>`.
    pub suffix: String,
    pub max_output_tokens: u32,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            out_dir: ".".into(),
            suffix: "bigquery_inserts.sql".into(),
            max_output_tokens: 512,
        }
    }
}
