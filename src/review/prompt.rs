//! Prompt rendering.
//!
//! The prompt is a pure function of the file content, its kind and the
//! [`ReviewProfile`]: number every line, then wrap the numbered code in a
//! fixed instruction template that lists the categories to analyse and the
//! exact HTML table contract the answer must follow.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collector::{FileKind, SourceFile};
use crate::report::sql::TransformationRow;

use super::traits::{GenerationParams, ReviewRequest};

// ── Categories / profile ─────────────────────────────────────────

/// One section of the requested review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    /// Heading, e.g. "Syntax Errors".
    pub title: String,
    /// What to look for.
    pub focus: String,
    /// Exact table column names.
    pub columns: Vec<String>,
    /// Single-row table text when nothing is found.
    pub fallback: String,
}

impl CategorySpec {
    fn new(title: &str, focus: &str, columns: &[&str], fallback: &str) -> Self {
        Self {
            title: title.into(),
            focus: focus.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            fallback: fallback.into(),
        }
    }
}

/// Everything that varies between review flavours.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewProfile {
    /// Language label used in the persona line ("Python", "SQL").
    pub language: String,
    pub categories: Vec<CategorySpec>,
    pub include_criticality: bool,
    /// Accepted issues the model should not report again.
    pub ignore: Vec<String>,
}

impl ReviewProfile {
    /// Built-in profile for a file kind.
    pub fn for_kind(kind: FileKind) -> Self {
        Self {
            language: kind.label().to_string(),
            categories: standard_categories(kind),
            include_criticality: true,
            ignore: Vec::new(),
        }
    }
}

/// The five standard categories. Only the improvement hints differ by kind.
pub fn standard_categories(kind: FileKind) -> Vec<CategorySpec> {
    let concise = match kind {
        FileKind::Sql => "set-based operations, CTEs instead of repeated subqueries",
        _ => "comprehensions, loops and standard-library helpers",
    };
    let injection = match kind {
        FileKind::Sql => "SQL injection, excessive privileges, unfiltered dynamic SQL",
        _ => "SQL injection, XSS, insecure deserialization, hard-coded secrets",
    };

    vec![
        CategorySpec::new(
            "Syntax Errors",
            "Identify the exact error-causing line numbers and the exact syntax errors, explain each one and give only the minimal fix.",
            &["Identification", "Explanation", "Fix"],
            "No Syntax Errors Found",
        ),
        CategorySpec::new(
            "Code Bugs",
            "Identify potential logical or runtime errors, explain why the code is problematic and give the minimal change that fixes it.",
            &["Identification", "Explanation", "Fix"],
            "No Code Bugs Found",
        ),
        CategorySpec::new(
            "Security Vulnerabilities",
            &format!(
                "Highlight potential security vulnerabilities ({injection}), explain each one and give the minimal mitigation."
            ),
            &["Identification", "Explanation", "Fix"],
            "No Security Vulnerabilities Found",
        ),
        CategorySpec::new(
            "Duplicate Code",
            "Highlight the lines that are duplicated and recommend how to consolidate them.",
            &["Identification", "Suggestion"],
            "No duplicate code in this file",
        ),
        CategorySpec::new(
            "Code Improvement Suggestions",
            &format!(
                "Highlight unnecessary complexity, redundant blocks and places where more concise constructs ({concise}) apply."
            ),
            &["Identification", "Suggestion"],
            "No Code Improvement Suggestions Found",
        ),
    ]
}

// ── Line numbering ───────────────────────────────────────────────

/// Prefix every line with `Line <n>: `, 1-based. `\r\n` endings are
/// normalised; a trailing newline does not produce an extra empty line.
pub fn number_lines(content: &str) -> String {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("Line {}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Ignore list ──────────────────────────────────────────────────

/// Load accepted issues, one per line. A missing file is a warning, not an
/// error: the review simply runs without an ignore clause.
pub fn load_ignore_list(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignore list not readable, no issues will be ignored");
            Vec::new()
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────

/// Builds one [`ReviewRequest`] per [`SourceFile`]. Holds no per-file state.
#[derive(Debug, Clone)]
pub struct ReviewRequestBuilder {
    params: GenerationParams,
    include_criticality: bool,
    ignore: Vec<String>,
    categories: Option<Vec<CategorySpec>>,
}

impl ReviewRequestBuilder {
    pub fn new(params: GenerationParams) -> Self {
        Self {
            params,
            include_criticality: true,
            ignore: Vec::new(),
            categories: None,
        }
    }

    pub fn with_criticality(mut self, enabled: bool) -> Self {
        self.include_criticality = enabled;
        self
    }

    pub fn with_ignore_list(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    /// Replace the built-in categories for every kind.
    pub fn with_categories(mut self, categories: Option<Vec<CategorySpec>>) -> Self {
        self.categories = categories.filter(|c| !c.is_empty());
        self
    }

    pub fn params(&self) -> GenerationParams {
        self.params
    }

    pub fn profile_for(&self, kind: FileKind) -> ReviewProfile {
        let mut profile = ReviewProfile::for_kind(kind);
        if let Some(ref categories) = self.categories {
            profile.categories = categories.clone();
        }
        profile.include_criticality = self.include_criticality;
        profile.ignore = self.ignore.clone();
        profile
    }

    pub fn build(&self, file: &SourceFile) -> ReviewRequest {
        let profile = self.profile_for(file.kind);
        ReviewRequest {
            path: file.path.clone(),
            prompt: render_review_prompt(&profile, &number_lines(&file.content)),
            params: self.params,
        }
    }

    /// Request that reports only issues absent from an earlier review.
    pub fn build_comparison(&self, file: &SourceFile, baseline: &str) -> ReviewRequest {
        let profile = self.profile_for(file.kind);
        let mut prompt = render_review_prompt(&profile, &number_lines(&file.content));
        let _ = write!(
            prompt,
            "\n\nA previous review of this file is given below as the baseline.\n\
             - Only report issues that are new compared with the baseline.\n\
             - Leave out every issue the baseline already lists, even if worded differently.\n\
             - Keep the same table format; use the fallback text when a category has no new issues.\n\n\
             The baseline review:\n{baseline}\n"
        );
        ReviewRequest {
            path: file.path.clone(),
            prompt,
            params: self.params,
        }
    }
}

// ── Templates ────────────────────────────────────────────────────

const CRITICALITY_GUIDE: &str = "Criticality levels:
    - Low: minor issues with little effect on behaviour (style, unused imports, small optimisations).
    - Medium: issues that cause wrong results in some cases or noticeably hurt readability and maintenance.
    - High: issues that stop the code from running, are directly exploitable, or severely affect correctness.";

/// Render the full review instruction around already-numbered code.
pub fn render_review_prompt(profile: &ReviewProfile, numbered_code: &str) -> String {
    let mut p = String::new();
    let _ = writeln!(
        p,
        "You are an expert {} code reviewer.\nAnalyze the code below and report on each of the following categories:\n",
        profile.language
    );

    for (i, category) in profile.categories.iter().enumerate() {
        let mut columns = category.columns.clone();
        if profile.include_criticality && !columns.iter().any(|c| c == "Criticality") {
            columns.push("Criticality".into());
        }
        let _ = writeln!(p, "{}. {}:", i + 1, category.title);
        let _ = writeln!(p, "    - Focus: {}", category.focus);
        let _ = writeln!(p, "    - Columns: {}", columns.join(", "));
        let _ = writeln!(
            p,
            "    - If nothing is found, output a table with the single row \"{}\".\n",
            category.fallback
        );
    }

    if profile.include_criticality {
        let _ = writeln!(p, "{CRITICALITY_GUIDE}\n");
    }

    p.push_str(
        "Output format:
    - Respond with HTML only: no markdown, no code fences, no document title, no \"File:\" heading.
    - Precede each table with its bold, numbered category heading.
    - Use <table width=\"100%\" border=\"1\" cellpadding=\"8\" style=\"border-collapse: collapse; overflow-wrap: break-word;\"> for every table.
    - Use exactly the listed column names for each table; no other columns are allowed.
    - Put the line number inside the Identification column.
    - Do not reproduce the code or write any code snippets.
",
    );

    if !profile.ignore.is_empty() {
        let _ = writeln!(
            p,
            "\nIgnore the issues mentioned in the ignore list: {}",
            profile.ignore.join(", ")
        );
    }

    let _ = write!(
        p,
        "\nThe code (each line is prefixed with its line number):\n{numbered_code}\n"
    );
    p
}

/// Request asking for one BigQuery expression implementing a row's
/// transformation description.
pub fn sql_expression_request(
    workbook: &Path,
    row: &TransformationRow,
    params: GenerationParams,
) -> ReviewRequest {
    ReviewRequest {
        path: workbook.to_path_buf(),
        prompt: format!(
            "You are a BigQuery SQL expert with extensive experience generating SQL statements. \
             Generate a BigQuery SQL expression for the following transformation description: {}\n\
             Source column: {}.{}\nTarget column: {}\n\
             Answer with the expression only.",
            row.transformation_logic, row.source_table, row.source_column, row.target_column
        ),
        params,
    }
}

// ── Tests ────────────────────────────────────────────────────────
