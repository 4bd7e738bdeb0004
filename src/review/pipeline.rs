//! Sequential review pipeline.
//!
//! For each discovered file, in discovery order:
//!
//! 1. build the request (a comparison request when a baseline exists),
//! 2. invoke the generator under the per-file timeout,
//! 3. record exactly one [`ReviewResult`]: succeeded, blocked or failed.
//!
//! A failing file never stops the run. The optional overall run timeout is
//! checked between files; once it has passed, every remaining file is
//! recorded as failed without a call, so the report still has one section
//! per discovered file.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::collector::SourceFile;
use crate::config::Config;
use crate::error::{Result, ReviewError};
use crate::report::sql::{GeneratedColumn, TransformationRow};
use crate::report::Report;

use super::baseline::BaselineMode;
use super::prompt::{load_ignore_list, sql_expression_request, ReviewRequestBuilder};
use super::traits::{GenerationParams, ReviewOutcome, ReviewRequest, ReviewResult, TextGenerator};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

const RUN_TIMEOUT_REASON: &str = "run timeout reached before review";

/// Run one call under `budget`; an elapsed budget is a service failure.
async fn invoke_with_timeout(
    generator: &dyn TextGenerator,
    request: &ReviewRequest,
    budget: Duration,
) -> Result<String> {
    match tokio::time::timeout(budget, generator.generate(request)).await {
        Ok(generated) => generated,
        Err(_) => Err(ReviewError::Service(format!(
            "timed out after {:.1}s",
            budget.as_secs_f64()
        ))),
    }
}

// ── Review pipeline ──────────────────────────────────────────────

pub struct ReviewPipeline {
    generator: Box<dyn TextGenerator>,
    builder: ReviewRequestBuilder,
    call_timeout: Duration,
    run_timeout: Option<Duration>,
    baseline: BaselineMode,
}

impl ReviewPipeline {
    pub fn new(generator: Box<dyn TextGenerator>, builder: ReviewRequestBuilder) -> Self {
        Self {
            generator,
            builder,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            run_timeout: None,
            baseline: BaselineMode::Off,
        }
    }

    /// Builder, timeouts and ignore list taken from `config`.
    pub fn from_config(config: &Config, generator: Box<dyn TextGenerator>) -> Self {
        let ignore = config
            .review
            .ignore_file
            .as_deref()
            .map(|p| load_ignore_list(&crate::config::expand_path(p)))
            .unwrap_or_default();
        let builder = ReviewRequestBuilder::new(GenerationParams::from(&config.model))
            .with_criticality(config.review.include_criticality)
            .with_categories(config.review.categories.clone())
            .with_ignore_list(ignore);

        Self::new(generator, builder)
            .with_call_timeout(Duration::from_secs(config.model.request_timeout_secs))
            .with_run_timeout(config.model.run_timeout_secs.map(Duration::from_secs))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_baseline(mut self, baseline: BaselineMode) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    fn request_for(&self, file: &SourceFile) -> ReviewRequest {
        if let BaselineMode::Compare(store) = &self.baseline {
            if let Some(baseline) = store.load(&file.path) {
                tracing::debug!(path = %file.path.display(), "comparing against baseline");
                return self.builder.build_comparison(file, &baseline);
            }
            tracing::debug!(path = %file.path.display(), "no baseline, running full review");
        }
        self.builder.build(file)
    }

    /// Review one file with the configured per-file timeout.
    pub async fn review_file(&self, file: &SourceFile) -> ReviewResult {
        self.review_file_within(file, self.call_timeout).await
    }

    async fn review_file_within(&self, file: &SourceFile, budget: Duration) -> ReviewResult {
        let start = Instant::now();
        let request = self.request_for(file);
        let generated = invoke_with_timeout(self.generator.as_ref(), &request, budget).await;
        let result = ReviewResult::from_generation(&file.path, generated, start.elapsed());

        let elapsed_ms = result.elapsed.as_millis() as u64;
        match result.outcome {
            ReviewOutcome::Succeeded => tracing::info!(
                path = %file.path.display(),
                elapsed_ms,
                chars = result.text.len(),
                "Review completed"
            ),
            ReviewOutcome::Blocked => tracing::warn!(
                path = %file.path.display(),
                reason = %result.text,
                "Review blocked by safety filters, continuing"
            ),
            ReviewOutcome::Failed => tracing::warn!(
                path = %file.path.display(),
                error = %result.text,
                "Review failed, continuing with next file"
            ),
        }

        if let BaselineMode::Save(store) = &self.baseline {
            if result.is_success() {
                match store.save(&file.path, &result.text) {
                    Ok(saved) => tracing::debug!(path = %saved.display(), "baseline saved"),
                    Err(e) => tracing::warn!(
                        path = %file.path.display(),
                        error = %e,
                        "failed to save baseline"
                    ),
                }
            }
        }

        result
    }

    /// Review every file and collect the results in order.
    pub async fn run<I>(&self, files: I) -> Report
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let started = Instant::now();
        let mut report = Report::new();

        let mut timed_out = false;
        for file in files {
            let budget = match self.run_timeout {
                _ if timed_out => None,
                Some(limit) => match limit.checked_sub(started.elapsed()) {
                    Some(left) if !left.is_zero() => Some(left.min(self.call_timeout)),
                    _ => {
                        tracing::warn!(
                            reviewed = report.len(),
                            "run timeout reached, remaining files are marked as not reviewed"
                        );
                        timed_out = true;
                        None
                    }
                },
                None => Some(self.call_timeout),
            };

            let Some(budget) = budget else {
                report.push(ReviewResult::failed(
                    &file.path,
                    RUN_TIMEOUT_REASON,
                    Duration::ZERO,
                ));
                continue;
            };

            tracing::info!(
                path = %file.path.display(),
                model = self.generator.name(),
                "Reviewing file"
            );
            report.push(self.review_file_within(&file, budget).await);
        }

        tracing::info!(
            files = report.len(),
            blocked = report.count(ReviewOutcome::Blocked),
            failed = report.count(ReviewOutcome::Failed),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Review run finished"
        );
        report
    }
}

// ── SQL expression generation ────────────────────────────────────

/// Asks the model for one SQL expression per transformation row.
pub struct SqlTransformer {
    generator: Box<dyn TextGenerator>,
    params: GenerationParams,
    call_timeout: Duration,
}

impl SqlTransformer {
    pub fn new(generator: Box<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self {
            generator,
            params,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config, generator: Box<dyn TextGenerator>) -> Self {
        let params = GenerationParams {
            max_output_tokens: config.sql.max_output_tokens,
            ..GenerationParams::from(&config.model)
        };
        Self::new(generator, params)
            .with_call_timeout(Duration::from_secs(config.model.request_timeout_secs))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// One generated column per row, in row order. Failures are kept as
    /// failed/blocked results and rendered as `NULL` columns.
    pub async fn transform(
        &self,
        workbook: &Path,
        rows: Vec<TransformationRow>,
    ) -> Vec<GeneratedColumn> {
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let start = Instant::now();
            let request = sql_expression_request(workbook, &row, self.params);
            let generated =
                invoke_with_timeout(self.generator.as_ref(), &request, self.call_timeout).await;
            let result = ReviewResult::from_generation(workbook, generated, start.elapsed());
            if !result.is_success() {
                tracing::warn!(
                    workbook = %workbook.display(),
                    column = %row.target_column,
                    outcome = %result.outcome,
                    reason = %result.text,
                    "SQL generation failed for column"
                );
            }
            columns.push(GeneratedColumn { row, result });
        }
        columns
    }
}

// ── Tests ────────────────────────────────────────────────────────
