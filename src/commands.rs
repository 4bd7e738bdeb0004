//! Subcommand arguments and the jobs behind them.
//!
//! A job validates its inputs up front (a missing root is reported before any
//! credentials are looked at), then runs the stages with whatever
//! [`TextGenerator`] the caller supplies. The `run_*` functions are the CLI
//! edge: they resolve credentials, build the Gemini client and print a
//! summary.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result as AnyResult};
use clap::{Args, Subcommand};

use crate::collector::changed::DEFAULT_GIT_RANGE;
use crate::collector::{ChangedFiles, CollectorOptions, FileCollector};
use crate::config::{expand_path, BodyRendering, Config, WriteMode};
use crate::error::{Result, ReviewError};
use crate::report::html::{write_report, HtmlOptions};
use crate::report::sql::{output_path, render_inserts};
use crate::report::Report;
use crate::review::{
    BaselineMode, BaselineStore, GeminiGenerator, ReviewPipeline, SqlTransformer, TextGenerator,
};
use crate::sheet::read_transformations;

const WORKBOOK_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

// ── Arguments ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Directory containing the files to review.
    pub root: PathBuf,

    /// Report file (default from config: code_review_report.html).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Descend into subdirectories (`--recursive false` for the top level only).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub recursive: Option<bool>,

    /// File extension to review; repeat for several (replaces the configured list).
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Add sections to an existing report instead of recreating it.
    #[arg(long, conflicts_with = "per_file")]
    pub append: bool,

    /// Write `<stem>_review.html` next to every reviewed file instead of one report.
    #[arg(long)]
    pub per_file: bool,

    /// Review only files changed in a git range.
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = DEFAULT_GIT_RANGE,
        value_name = "RANGE",
        conflicts_with = "changed_list"
    )]
    pub changed_from_git: Option<String>,

    /// Review only the files listed (one path per line) in FILE.
    #[arg(long, value_name = "FILE")]
    pub changed_list: Option<PathBuf>,

    /// File of accepted issues the model should not report again.
    #[arg(long, value_name = "FILE")]
    pub ignore_file: Option<String>,

    /// How model output is placed into the report.
    #[arg(long, value_enum)]
    pub body: Option<BodyRendering>,

    /// Use the streaming endpoint.
    #[arg(long)]
    pub stream: bool,

    /// Show per-file elapsed time in the report.
    #[arg(long)]
    pub show_timings: bool,

    /// Store every successful review as a baseline.
    #[arg(long, conflicts_with = "compare_baseline")]
    pub save_baseline: bool,

    /// Report only issues that are new relative to the stored baseline.
    #[arg(long)]
    pub compare_baseline: bool,

    /// Baseline directory (default from config: baseline).
    #[arg(long, value_name = "DIR")]
    pub baseline_dir: Option<String>,
}

impl ReviewArgs {
    /// Fold command-line overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.report.output.clone_from(output);
        }
        if let Some(recursive) = self.recursive {
            config.collector.recursive = recursive;
        }
        if !self.extensions.is_empty() {
            config.collector.extensions.clone_from(&self.extensions);
        }
        if self.append {
            config.report.write_mode = WriteMode::Append;
        }
        if self.per_file {
            config.report.write_mode = WriteMode::PerFile;
        }
        if let Some(ignore) = &self.ignore_file {
            config.review.ignore_file = Some(ignore.clone());
        }
        if let Some(body) = self.body {
            config.report.body = body;
        }
        if self.stream {
            config.model.stream = true;
        }
        if self.show_timings {
            config.report.show_timings = true;
        }
        if let Some(dir) = &self.baseline_dir {
            config.review.baseline_dir.clone_from(dir);
        }
    }

    pub fn baseline_mode(&self, config: &Config) -> BaselineMode {
        let store = || BaselineStore::new(expand_path(&config.review.baseline_dir));
        if self.save_baseline {
            BaselineMode::Save(store())
        } else if self.compare_baseline {
            BaselineMode::Compare(store())
        } else {
            BaselineMode::Off
        }
    }

    /// The changed-file allow-list, if one was requested.
    pub async fn changed_files(&self) -> Result<Option<ChangedFiles>> {
        if let Some(range) = &self.changed_from_git {
            return ChangedFiles::from_git(&self.root, range).await.map(Some);
        }
        self.changed_list
            .as_deref()
            .map(ChangedFiles::from_list_file)
            .transpose()
    }
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    /// Directory containing transformation workbooks (.xlsx).
    pub root: PathBuf,

    /// Where the generated .sql files go.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<String>,

    /// Output file name suffix: `<workbook stem>_<suffix>`.
    #[arg(long)]
    pub suffix: Option<String>,
}

impl SqlArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.out_dir {
            config.sql.out_dir.clone_from(dir);
        }
        if let Some(suffix) = &self.suffix {
            config.sql.suffix.clone_from(suffix);
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the default config file location.
    Path,
    /// Print the effective configuration as TOML.
    Show,
}

// ── Review job ───────────────────────────────────────────────────

/// What a finished review run produced.
#[derive(Debug)]
pub struct ReviewRun {
    pub report: Report,
    /// Report files written, in write order.
    pub written: Vec<PathBuf>,
    /// Wall time from first discovery to the last write.
    pub elapsed: Duration,
}

/// Closing line of a review run.
pub fn total_time_line(elapsed: Duration) -> String {
    format!("Total Time Taken for Review: {:.2} seconds", elapsed.as_secs_f64())
}

/// One review run: collect, review, write the HTML report.
pub struct ReviewJob {
    config: Config,
    root: PathBuf,
    options: CollectorOptions,
    baseline: BaselineMode,
}

impl ReviewJob {
    /// Fails with [`ReviewError::NotFound`] when `root` is not a directory.
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ReviewError::NotFound { path: root });
        }
        let options = CollectorOptions::new(
            config.collector.extensions.iter(),
            config.collector.recursive,
        );
        Ok(Self {
            config,
            root,
            options,
            baseline: BaselineMode::Off,
        })
    }

    pub fn with_changed(mut self, changed: Option<ChangedFiles>) -> Self {
        if let Some(changed) = changed {
            self.options = self.options.with_changed(changed);
        }
        self
    }

    pub fn with_baseline(mut self, baseline: BaselineMode) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn output(&self) -> PathBuf {
        expand_path(&self.config.report.output)
    }

    /// Review every matching file and write the report. Per-file failures
    /// end up as sections; only collection and writing errors are returned.
    pub async fn run(self, generator: Box<dyn TextGenerator>) -> Result<ReviewRun> {
        let started = Instant::now();
        let output = self.output();
        let collector = FileCollector::new(self.root, self.options)?;
        let pipeline =
            ReviewPipeline::from_config(&self.config, generator).with_baseline(self.baseline);

        let report = pipeline.run(collector.into_files()).await;

        let written = write_report(
            &report,
            &output,
            &HtmlOptions::from(&self.config.report),
            self.config.report.write_mode,
        )?;
        let elapsed = started.elapsed();
        tracing::info!(
            files = written.len(),
            sections = report.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "report written"
        );
        Ok(ReviewRun {
            report,
            written,
            elapsed,
        })
    }
}

// ── SQL job ──────────────────────────────────────────────────────

/// Transformation workbooks to BigQuery `INSERT` files.
pub struct SqlJob {
    config: Config,
    root: PathBuf,
}

impl SqlJob {
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ReviewError::NotFound { path: root });
        }
        Ok(Self { config, root })
    }

    /// One `.sql` file per readable workbook; returns the files written.
    /// Unreadable workbooks are logged and skipped.
    pub async fn run(self, generator: Box<dyn TextGenerator>) -> Result<Vec<PathBuf>> {
        let options = CollectorOptions::new(WORKBOOK_EXTENSIONS, self.config.collector.recursive);
        let workbooks = FileCollector::new(&self.root, options)?.paths();
        let transformer = SqlTransformer::from_config(&self.config, generator);
        let out_dir = expand_path(&self.config.sql.out_dir);

        let mut written = Vec::new();
        for workbook in workbooks {
            tracing::info!(path = %workbook.display(), "Processing workbook");
            let rows = match read_transformations(&workbook) {
                Ok(rows) if rows.is_empty() => {
                    tracing::warn!(path = %workbook.display(), "no transformation rows, skipping");
                    continue;
                }
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping workbook");
                    continue;
                }
            };

            let columns = transformer.transform(&workbook, rows).await;
            let target = output_path(&out_dir, &workbook, &self.config.sql.suffix);
            std::fs::create_dir_all(&out_dir)?;
            std::fs::write(&target, render_inserts(&columns))?;
            tracing::info!(path = %target.display(), columns = columns.len(), "SQL written");
            written.push(target);
        }
        Ok(written)
    }
}

// ── CLI edge ─────────────────────────────────────────────────────

pub async fn run_review(mut config: Config, args: ReviewArgs) -> AnyResult<()> {
    args.apply(&mut config);
    let baseline = args.baseline_mode(&config);

    let job = ReviewJob::new(config.clone(), &args.root)?;
    let changed = args.changed_files().await?;
    if let Some(changed) = &changed {
        println!("Reviewing only {} changed file(s)", changed.len());
    }
    let job = job.with_changed(changed).with_baseline(baseline);

    let generator = GeminiGenerator::from_config(&config.model)?;
    let run = job.run(Box::new(generator)).await?;

    println!("{}", run.report.summary());
    match run.written.as_slice() {
        [single] => println!("Review report written to {}", single.display()),
        many => println!("{} review report(s) written", many.len()),
    }
    println!("{}", total_time_line(run.elapsed));
    Ok(())
}

pub async fn run_sql(mut config: Config, args: SqlArgs) -> AnyResult<()> {
    args.apply(&mut config);
    let job = SqlJob::new(config.clone(), &args.root)?;
    let generator = GeminiGenerator::from_config(&config.model)?;

    let written = job.run(Box::new(generator)).await?;
    for path in &written {
        println!("Generated SQL query has been written to {}", path.display());
    }
    if written.is_empty() {
        println!("No transformation workbooks found in {}", args.root.display());
    }
    Ok(())
}

pub fn run_config(config: &Config, explicit: Option<&Path>, action: ConfigAction) -> AnyResult<()> {
    match action {
        ConfigAction::Path => {
            let path = explicit
                .map(Path::to_path_buf)
                .or_else(crate::config::default_config_path)
                .context("no config directory available on this platform")?;
            println!("{}", path.display());
        }
        ConfigAction::Show => print!("{}", config.to_toml()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        review: ReviewArgs,
    }

    fn parse(args: &[&str]) -> ReviewArgs {
        let mut argv = vec!["batch-review"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().review
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "src",
            "--output",
            "out.html",
            "--recursive",
            "false",
            "--ext",
            "py",
            "--ext",
            "sql",
            "--append",
            "--body",
            "escaped",
            "--stream",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.report.output, "out.html");
        assert!(!config.collector.recursive);
        assert_eq!(config.collector.extensions, vec!["py", "sql"]);
        assert_eq!(config.report.write_mode, WriteMode::Append);
        assert_eq!(config.report.body, BodyRendering::Escaped);
        assert!(config.model.stream);
    }

    #[test]
    fn bare_changed_from_git_uses_default_range() {
        let args = parse(&["src", "--changed-from-git"]);
        assert_eq!(args.changed_from_git.as_deref(), Some(DEFAULT_GIT_RANGE));
        let args = parse(&["src", "--changed-from-git", "main..HEAD"]);
        assert_eq!(args.changed_from_git.as_deref(), Some("main..HEAD"));
    }

    #[test]
    fn baseline_flags_are_exclusive() {
        let argv = ["batch-review", "src", "--save-baseline", "--compare-baseline"];
        assert!(Harness::try_parse_from(argv).is_err());

        let args = parse(&["src", "--compare-baseline", "--baseline-dir", "bl"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(
            args.baseline_mode(&config),
            BaselineMode::Compare(BaselineStore::new("bl"))
        );
    }

    #[test]
    fn per_file_flag_selects_per_file_mode() {
        let args = parse(&["src", "--per-file"]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.report.write_mode, WriteMode::PerFile);

        let argv = ["batch-review", "src", "--per-file", "--append"];
        assert!(Harness::try_parse_from(argv).is_err());
    }

    #[test]
    fn total_time_line_has_two_decimals() {
        assert_eq!(
            total_time_line(Duration::from_millis(1_500)),
            "Total Time Taken for Review: 1.50 seconds"
        );
    }

    #[test]
    fn missing_root_is_not_found() {
        let err = ReviewJob::new(Config::default(), "/definitely/not/here").err().unwrap();
        assert!(matches!(err, ReviewError::NotFound { .. }));
        let err = SqlJob::new(Config::default(), "/definitely/not/here").err().unwrap();
        assert!(matches!(err, ReviewError::NotFound { .. }));
    }
}
