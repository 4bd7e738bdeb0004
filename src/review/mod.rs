//! Per-file AI review.
//!
//! ```text
//! SourceFile ─▸ ReviewRequestBuilder ─▸ ReviewRequest ─▸ TextGenerator ─▸ ReviewResult
//!                 (line numbers +          (prompt +        (Gemini, or a     (succeeded |
//!                  category template)       params)          test stub)        blocked | failed)
//! ```
//!
//! [`ReviewPipeline`] drives the chain sequentially over a collector's
//! output and hands back a [`crate::report::Report`] in discovery order.
//!
//! ## Extension
//!
//! Add new backends by implementing [`TextGenerator`]; the pipeline only
//! depends on the trait.

pub mod baseline;
pub mod gemini;
pub mod pipeline;
pub mod prompt;
pub mod traits;

#[allow(unused_imports)]
pub use baseline::{BaselineMode, BaselineStore};
#[allow(unused_imports)]
pub use gemini::GeminiGenerator;
#[allow(unused_imports)]
pub use pipeline::{ReviewPipeline, SqlTransformer};
#[allow(unused_imports)]
pub use prompt::{number_lines, CategorySpec, ReviewProfile, ReviewRequestBuilder};
#[allow(unused_imports)]
pub use traits::{
    GenerationParams, ReviewOutcome, ReviewRequest, ReviewResult, TextGenerator,
};
