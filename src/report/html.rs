//! HTML report rendering.
//!
//! The document shape is fixed; model output only ever enters through
//! [`render_body`], which either escapes it into a `<pre>` block or places it,
//! attribute-escaped, into a sandboxed `<iframe srcdoc>`. Either way a
//! malformed answer cannot break out of its own `<section>`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{BodyRendering, ReportConfig, WriteMode};
use crate::error::Result;
use crate::review::traits::{ReviewOutcome, ReviewResult};

use super::Report;

/// Marks the end of the section list; append mode splices new sections before it.
pub const SECTIONS_END_MARKER: &str = "<!-- batch-review:end-of-reviews -->";

const EMPTY_RESPONSE_TEXT: &str = "No response received from the AI model.";

const REPORT_STYLES: &str = "body { font-family: Arial, sans-serif; margin: 20px; background-color: #ecf0f1; color: #000; }
h1 { color: #34495e; }
section.review { margin-bottom: 20px; border: 1px solid #ccc; padding: 15px; border-radius: 8px; background-color: #f9f9f9; }
section.review h2 { color: #2c3e50; margin-top: 0; }
section.review .path { font-style: italic; }
section.review .timing { color: #555; }
section.review pre { white-space: pre-wrap; overflow-wrap: break-word; }
section.review iframe { width: 100%; min-height: 32rem; border: none; background: #fff; resize: vertical; }
.placeholder { font-weight: bold; }
section.blocked { border-color: #d68910; }
section.blocked .placeholder { color: #b9770e; }
section.failed { border-color: #c0392b; }
section.failed .placeholder { color: #c0392b; }";

/// Rendering knobs taken from `[report]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlOptions {
    pub title: String,
    pub body: BodyRendering,
    pub show_timings: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self::from(&ReportConfig::default())
    }
}

impl From<&ReportConfig> for HtmlOptions {
    fn from(config: &ReportConfig) -> Self {
        Self {
            title: config.title.clone(),
            body: config.body,
            show_timings: config.show_timings,
        }
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// The review text of one result, isolated from the surrounding document.
pub fn render_body(result: &ReviewResult, body: BodyRendering) -> String {
    match result.outcome {
        ReviewOutcome::Blocked => format!(
            "<p class=\"placeholder\">Blocked by safety filters: {}</p>",
            escape_html(&result.text)
        ),
        ReviewOutcome::Failed => format!(
            "<p class=\"placeholder\">Error generating review: {}</p>",
            escape_html(&result.text)
        ),
        ReviewOutcome::Succeeded if result.text.trim().is_empty() => {
            format!("<p class=\"placeholder\">{EMPTY_RESPONSE_TEXT}</p>")
        }
        ReviewOutcome::Succeeded => match body {
            BodyRendering::Escaped => format!("<pre>{}</pre>", escape_html(&result.text)),
            BodyRendering::Sandboxed => format!(
                "<iframe sandbox=\"\" title=\"Review for {}\" srcdoc=\"{}\"></iframe>",
                escape_html(&result.file_name()),
                escape_html(&result.text)
            ),
        },
    }
}

/// One delimited `<section>` per file.
pub fn render_section(result: &ReviewResult, options: &HtmlOptions) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "<section class=\"review {}\" data-outcome=\"{}\">",
        result.outcome.label(),
        result.outcome.label()
    );
    let _ = writeln!(s, "<h2>Review for {}</h2>", escape_html(&result.file_name()));
    let _ = writeln!(
        s,
        "<p class=\"path\">File Path: {}</p>",
        escape_html(&result.path.display().to_string())
    );
    if options.show_timings {
        let _ = writeln!(
            s,
            "<p class=\"timing\">Time taken: {:.2} seconds</p>",
            result.elapsed.as_secs_f64()
        );
    }
    let _ = writeln!(s, "<div class=\"body\">{}</div>", render_body(result, options.body));
    s.push_str("</section>\n");
    s
}

fn render_sections(report: &Report, options: &HtmlOptions) -> String {
    report
        .iter()
        .map(|result| render_section(result, options))
        .collect()
}

/// The complete document.
pub fn render_document(report: &Report, options: &HtmlOptions) -> String {
    let title = escape_html(&options.title);
    let sections = render_sections(report, options);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
{REPORT_STYLES}
</style>
</head>
<body>
<h1>{title}</h1>
<main>
{sections}{SECTIONS_END_MARKER}
</main>
</body>
</html>
"#
    )
}

/// Standalone report location for one reviewed file: `<dir>/<stem>_review.html`.
pub fn per_file_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| crate::collector::display_name(source));
    source.with_file_name(format!("{stem}_review.html"))
}

/// Persist the report and return the files written.
///
/// [`WriteMode::Recreate`] replaces `path`. In [`WriteMode::Append`] an
/// existing report written by this tool gains the new sections before its
/// end marker; anything else at `path` is replaced. [`WriteMode::PerFile`]
/// ignores `path` and writes one document per result next to its source.
pub fn write_report(
    report: &Report,
    path: &Path,
    options: &HtmlOptions,
    mode: WriteMode,
) -> Result<Vec<PathBuf>> {
    match mode {
        WriteMode::PerFile => write_per_file(report, options),
        WriteMode::Append => {
            append_report(report, path, options)?;
            Ok(vec![path.to_path_buf()])
        }
        WriteMode::Recreate => {
            create_parent(path)?;
            std::fs::write(path, render_document(report, options))?;
            Ok(vec![path.to_path_buf()])
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn append_report(report: &Report, path: &Path, options: &HtmlOptions) -> Result<()> {
    create_parent(path)?;
    match std::fs::read_to_string(path) {
        Ok(existing) => {
            if let Some(at) = existing.find(SECTIONS_END_MARKER) {
                let mut merged = String::with_capacity(existing.len() + 4096);
                merged.push_str(&existing[..at]);
                merged.push_str(&render_sections(report, options));
                merged.push_str(&existing[at..]);
                std::fs::write(path, merged)?;
                tracing::debug!(path = %path.display(), added = report.len(), "appended to report");
                return Ok(());
            }
            tracing::warn!(path = %path.display(), "existing file is not a batch-review report, recreating");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::write(path, render_document(report, options))?;
    Ok(())
}

fn write_per_file(report: &Report, options: &HtmlOptions) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(report.len());
    for result in report.iter() {
        let target = per_file_path(&result.path);
        let single: Report = std::iter::once(result.clone()).collect();
        let page = HtmlOptions {
            title: format!("Review for {}", result.file_name()),
            ..options.clone()
        };
        std::fs::write(&target, render_document(&single, &page))?;
        tracing::debug!(path = %target.display(), "per-file report written");
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn escaped() -> HtmlOptions {
        HtmlOptions {
            body: BodyRendering::Escaped,
            ..HtmlOptions::default()
        }
    }

    fn report(results: Vec<ReviewResult>) -> Report {
        results.into_iter().collect()
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn one_section_per_result_in_order() {
        let r = report(vec![
            ReviewResult::succeeded("py/a.py", "first", Duration::ZERO),
            ReviewResult::succeeded("py/b.py", "second", Duration::ZERO),
        ]);
        let html = render_document(&r, &escaped());
        assert_eq!(html.matches("<section class=\"review").count(), 2);
        let a = html.find("Review for a.py").unwrap();
        let b = html.find("Review for b.py").unwrap();
        assert!(a < b);
        assert!(html.contains("File Path: py/a.py"));
        assert!(html.contains("<pre>first</pre>"));
    }

    #[test]
    fn blocked_and_failed_are_distinguishable() {
        let r = report(vec![
            ReviewResult::blocked("a.py", "prompt blocked (SAFETY)", Duration::ZERO),
            ReviewResult::failed("b.py", "service error: 503", Duration::ZERO),
        ]);
        let html = render_document(&r, &HtmlOptions::default());
        assert!(html.contains("<section class=\"review blocked\""));
        assert!(html.contains("Blocked by safety filters: prompt blocked (SAFETY)"));
        assert!(html.contains("<section class=\"review failed\""));
        assert!(html.contains("Error generating review: service error: 503"));
    }

    #[test]
    fn empty_response_gets_placeholder() {
        let r = ReviewResult::succeeded("a.py", "  \n", Duration::ZERO);
        assert!(render_body(&r, BodyRendering::Sandboxed).contains(EMPTY_RESPONSE_TEXT));
    }

    #[test]
    fn malformed_model_html_stays_inside_its_section() {
        let r = ReviewResult::succeeded("a.py", "<table><tr><td>unclosed</section>", Duration::ZERO);
        let body = render_body(&r, BodyRendering::Sandboxed);
        assert!(body.starts_with("<iframe sandbox=\"\""));
        assert!(body.contains("srcdoc=\"&lt;table&gt;&lt;tr&gt;&lt;td&gt;unclosed&lt;/section&gt;\""));
        assert!(!body.contains("</section>"));

        let pre = render_body(&r, BodyRendering::Escaped);
        assert!(!pre.contains("</section>"));
    }

    #[test]
    fn timings_only_when_enabled() {
        let r = report(vec![ReviewResult::succeeded("a.py", "x", Duration::from_millis(1500))]);
        assert!(!render_document(&r, &escaped()).contains("Time taken"));
        let timed = HtmlOptions {
            show_timings: true,
            ..escaped()
        };
        assert!(render_document(&r, &timed).contains("Time taken: 1.50 seconds"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let r = report(vec![ReviewResult::succeeded("a.py", "x", Duration::from_millis(7))]);
        assert_eq!(
            render_document(&r, &HtmlOptions::default()),
            render_document(&r, &HtmlOptions::default())
        );
    }

    #[test]
    fn append_splices_before_end_marker() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("review.html");

        let first = report(vec![ReviewResult::succeeded("a.py", "one", Duration::ZERO)]);
        write_report(&first, &path, &escaped(), WriteMode::Append).unwrap();
        let second = report(vec![ReviewResult::succeeded("b.py", "two", Duration::ZERO)]);
        write_report(&second, &path, &escaped(), WriteMode::Append).unwrap();

        let html = std::fs::read_to_string(&path).unwrap();
        assert_eq!(html.matches("<!DOCTYPE html>").count(), 1);
        assert_eq!(html.matches("<section").count(), 2);
        assert!(html.find("<pre>one</pre>").unwrap() < html.find("<pre>two</pre>").unwrap());
        assert!(html.find("<pre>two</pre>").unwrap() < html.find(SECTIONS_END_MARKER).unwrap());
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn recreate_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("review.html");
        std::fs::write(&path, "stale").unwrap();

        let r = report(vec![ReviewResult::succeeded("a.py", "fresh", Duration::ZERO)]);
        write_report(&r, &path, &escaped(), WriteMode::Recreate).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(!html.contains("stale"));
        assert!(html.contains("<pre>fresh</pre>"));
    }

    #[test]
    fn per_file_mode_writes_one_document_per_source() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.py");
        let b = tmp.path().join("pkg").join("b.sql");
        std::fs::create_dir_all(b.parent().unwrap()).unwrap();

        let r = report(vec![
            ReviewResult::succeeded(&a, "alpha", Duration::ZERO),
            ReviewResult::failed(&b, "service error: 503", Duration::ZERO),
        ]);
        let combined = tmp.path().join("combined.html");
        let written = write_report(&r, &combined, &escaped(), WriteMode::PerFile).unwrap();

        assert_eq!(
            written,
            vec![tmp.path().join("a_review.html"), tmp.path().join("pkg").join("b_review.html")]
        );
        assert!(!combined.exists());

        let first = std::fs::read_to_string(&written[0]).unwrap();
        assert_eq!(first.matches("<section").count(), 1);
        assert!(first.contains("<title>Review for a.py</title>"));
        assert!(first.contains("<pre>alpha</pre>"));

        let second = std::fs::read_to_string(&written[1]).unwrap();
        assert!(second.contains("Error generating review: service error: 503"));
    }

    #[test]
    fn append_to_foreign_file_recreates_it() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("review.html");
        std::fs::write(&path, "<html>hand written</html>").unwrap();

        let r = report(vec![ReviewResult::succeeded("a.py", "x", Duration::ZERO)]);
        write_report(&r, &path, &escaped(), WriteMode::Append).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(!html.contains("hand written"));
        assert!(html.contains(SECTIONS_END_MARKER));
    }
}
