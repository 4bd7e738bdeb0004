//! Batch AI code review.
//!
//! ```text
//! FileCollector ─▸ ReviewRequestBuilder ─▸ TextGenerator (Gemini) ─▸ Report ─▸ HTML / SQL
//! ```
//!
//! The library is organised by stage: [`collector`] discovers files,
//! [`review`] turns each one into a model call and a [`review::ReviewResult`],
//! [`report`] renders the run. [`commands`] wires the stages together for the
//! `batch-review` binary and for embedding callers that bring their own
//! [`review::TextGenerator`].

pub mod collector;
pub mod commands;
pub mod config;
pub mod error;
pub mod report;
pub mod review;
pub mod sheet;

pub use config::Config;
pub use error::{Result, ReviewError};
