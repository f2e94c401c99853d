//! Error types for harvesting runs
//!
//! Fatal conditions abort a run and surface to the caller as `ScrapeError`.
//! Local conditions (stale elements, empty candidate sets, per-item download
//! failures) are recovered where they happen and never appear here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::driver::DriverError;

/// Result type alias for harvesting operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Fatal errors for a single harvesting run
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Requested browser family is not recognised
    #[error("Unsupported browser '{0}' (expected one of: Chrome, Chromium, Firefox)")]
    UnsupportedBrowser(String),

    /// Browser could not be launched or connected
    #[error("Browser error: {0}")]
    Browser(String),

    /// Non-recoverable driver failure during harvesting
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The enlarged-image selectors keep matching nothing: page markup has drifted
    #[error(
        "Skipped {skipped} thumbnails with no resolvable image; selectors no longer match the page{}",
        page_dump.as_ref().map(|p| format!(" (page source saved to {})", p.display())).unwrap_or_default()
    )]
    TooManyEmptyElements {
        skipped: u32,
        page_dump: Option<PathBuf>,
    },

    /// End-of-run error ratio exceeded the configured ceiling
    #[error("Error rate {rate:.3} exceeds acceptable rate {acceptable:.3} (errors: {tally:?})")]
    UnacceptableErrorRate {
        rate: f64,
        acceptable: f64,
        tally: BTreeMap<String, usize>,
    },

    /// No implementation exists for the requested endpoint
    #[error("No implementation for endpoint '{0}' (available: google-images)")]
    UnimplementedEndpoint(String),

    /// The run finished without producing a single document
    #[error("{0} yielded no documents")]
    NoDocumentsReturned(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failure outside of per-item processing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization of the manifest or metadata failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain
        Self::Browser(format!("{err:#}"))
    }
}

impl ScrapeError {
    /// Whether the error stems from page markup no longer matching the selectors
    #[must_use]
    pub fn is_markup_drift(&self) -> bool {
        matches!(self, Self::TooManyEmptyElements { .. })
    }
}
