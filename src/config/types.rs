//! Core configuration types for harvesting runs
//!
//! This module contains the main `ScrapeConfig` struct and the browser
//! settings threaded from the run coordinator into the driver session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScrapeError;

/// Browser family used to drive the results page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BrowserFamily {
    #[default]
    Chrome,
    Chromium,
    Firefox,
}

impl FromStr for BrowserFamily {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "google-chrome" => Ok(Self::Chrome),
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            _ => Err(ScrapeError::UnsupportedBrowser(s.to_string())),
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chrome => "Chrome",
            Self::Chromium => "Chromium",
            Self::Firefox => "Firefox",
        };
        f.write_str(name)
    }
}

/// How the end-of-run error ratio is computed
///
/// `DistinctKinds` divides the number of distinct error kinds by the requested
/// item count. Many failures sharing one kind count once. `Occurrences`
/// divides the total number of failed items instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorRateBasis {
    #[default]
    DistinctKinds,
    Occurrences,
}

/// Settings for the browser owned by one driver session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub family: BrowserFamily,
    pub headless: bool,
    /// Proxy server passed to the browser as `--proxy-server`
    pub proxy: Option<String>,
    /// Explicit browser executable; discovered or downloaded when unset
    pub executable: Option<PathBuf>,
    /// DevTools websocket/HTTP endpoint of an already running browser.
    /// When set, the session connects instead of launching.
    pub remote_endpoint: Option<String>,
    /// Profile directory; a per-process temp directory when unset
    pub user_data_dir: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub request_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            family: BrowserFamily::default(),
            headless: true,
            proxy: None,
            executable: None,
            remote_endpoint: None,
            user_data_dir: None,
            window_size: (1920, 1080),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Main configuration struct for a harvesting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Directory receiving `<image_id>.jpg`, `related/` and `manifest.json`
    pub(crate) output_dir: PathBuf,
    pub(crate) browser: BrowserConfig,

    /// Base interval for fuzzed pauses; every pause lasts between one and two
    /// times this value (scaled per interaction).
    pub(crate) interaction_delay: Duration,

    /// Bound on a full image download
    pub(crate) download_timeout: Duration,

    /// Bound on the metadata-only header request
    pub(crate) header_timeout: Duration,

    pub(crate) acceptable_error_rate: f64,
    pub(crate) error_rate_basis: ErrorRateBasis,

    /// Resize persisted images to these dimensions when set
    pub(crate) compress_dimensions: Option<(u32, u32)>,

    pub(crate) write_manifest: bool,

    /// Wall-clock budget for harvesting, checked between iterations
    pub(crate) run_timeout: Option<Duration>,

    /// Seed for jitter and tie-breaking; entropy when unset
    pub(crate) rng_seed: Option<u64>,

    /// Save the page source when the markup-drift ceiling is hit
    pub(crate) dump_page_on_failure: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            browser: BrowserConfig::default(),
            interaction_delay: Duration::from_millis(300),
            download_timeout: Duration::from_secs(30),
            header_timeout: Duration::from_secs(10),
            acceptable_error_rate: 0.2,
            error_rate_basis: ErrorRateBasis::default(),
            compress_dimensions: None,
            write_manifest: true,
            run_timeout: None,
            rng_seed: None,
            dump_page_on_failure: true,
        }
    }
}
