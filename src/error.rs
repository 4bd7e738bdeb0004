//! Error taxonomy for a review run.
//!
//! Only [`ReviewError::NotFound`], [`ReviewError::Config`] and
//! [`ReviewError::Io`] abort a run. Read, service and safety errors stay
//! inside the per-file boundary: the collector skips unreadable files and the
//! pipeline turns remote failures into placeholder sections.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// The root directory does not exist or is not a directory.
    #[error("directory not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A single input could not be read or decoded.
    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// The text-generation call failed (network, quota, HTTP status, bad payload, timeout).
    #[error("service error: {0}")]
    Service(String),

    /// The provider declined to generate content because of a safety policy.
    #[error("blocked by safety filters: {0}")]
    SafetyBlocked(String),

    /// Invalid or incomplete configuration (missing API key, failing git command, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing an output artifact failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReviewError {
    pub fn read(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Config(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
