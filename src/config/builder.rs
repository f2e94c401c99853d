//! Type-safe builder for `ScrapeConfig` using the typestate pattern
//!
//! The output directory is the only required field; `build()` is only
//! available once it has been set.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Duration;

use super::types::{BrowserConfig, BrowserFamily, ErrorRateBasis, ScrapeConfig};
use crate::error::{ScrapeError, ScrapeResult};

// Type states for the builder
pub struct WithOutputDir;

pub struct ScrapeConfigBuilder<State = ()> {
    pub(crate) config: ScrapeConfig,
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for ScrapeConfigBuilder<()> {
    fn default() -> Self {
        Self {
            config: ScrapeConfig::default(),
            output_dir: None,
            _phantom: PhantomData,
        }
    }
}

impl ScrapeConfig {
    /// Create a builder for configuring a `ScrapeConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> ScrapeConfigBuilder<()> {
        ScrapeConfigBuilder::default()
    }
}

impl ScrapeConfigBuilder<()> {
    pub fn output_dir(self, dir: impl Into<PathBuf>) -> ScrapeConfigBuilder<WithOutputDir> {
        ScrapeConfigBuilder {
            config: self.config,
            output_dir: Some(dir.into()),
            _phantom: PhantomData,
        }
    }
}

impl ScrapeConfigBuilder<WithOutputDir> {
    /// Validate and produce the configuration
    ///
    /// Relative output directories are resolved against the current working
    /// directory so every later path operation sees an absolute path.
    pub fn build(self) -> ScrapeResult<ScrapeConfig> {
        let mut config = self.config;
        let dir = self
            .output_dir
            .ok_or_else(|| ScrapeError::Config("output_dir is required".to_string()))?;

        config.output_dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };

        if !(0.0..=1.0).contains(&config.acceptable_error_rate) {
            return Err(ScrapeError::Config(format!(
                "acceptable_error_rate must be within [0, 1], got {}",
                config.acceptable_error_rate
            )));
        }
        if config.download_timeout.is_zero() || config.header_timeout.is_zero() {
            return Err(ScrapeError::Config(
                "download and header timeouts must be non-zero".to_string(),
            ));
        }
        if let Some((w, h)) = config.compress_dimensions
            && (w == 0 || h == 0)
        {
            return Err(ScrapeError::Config(format!(
                "compress dimensions must be non-zero, got {w}x{h}"
            )));
        }
        if config.browser.family == BrowserFamily::Firefox && config.browser.remote_endpoint.is_none() {
            return Err(ScrapeError::Config(
                "Firefox cannot be launched locally; set remote_endpoint to a running instance"
                    .to_string(),
            ));
        }

        Ok(config)
    }
}

// Optional settings are available in every state
impl<State> ScrapeConfigBuilder<State> {
    #[must_use]
    pub fn browser(mut self, browser: BrowserConfig) -> Self {
        self.config.browser = browser;
        self
    }

    #[must_use]
    pub fn browser_family(mut self, family: BrowserFamily) -> Self {
        self.config.browser.family = family;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.browser.headless = headless;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.config.browser.proxy = proxy;
        self
    }

    #[must_use]
    pub fn remote_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.config.browser.remote_endpoint = endpoint;
        self
    }

    /// Base interval for fuzzed pauses between page interactions
    #[must_use]
    pub fn interaction_delay(mut self, delay: Duration) -> Self {
        self.config.interaction_delay = delay;
        self
    }

    #[must_use]
    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout;
        self
    }

    #[must_use]
    pub fn header_timeout(mut self, timeout: Duration) -> Self {
        self.config.header_timeout = timeout;
        self
    }

    #[must_use]
    pub fn acceptable_error_rate(mut self, rate: f64) -> Self {
        self.config.acceptable_error_rate = rate;
        self
    }

    #[must_use]
    pub fn error_rate_basis(mut self, basis: ErrorRateBasis) -> Self {
        self.config.error_rate_basis = basis;
        self
    }

    #[must_use]
    pub fn compress_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.config.compress_dimensions = dimensions;
        self
    }

    #[must_use]
    pub fn write_manifest(mut self, write: bool) -> Self {
        self.config.write_manifest = write;
        self
    }

    #[must_use]
    pub fn run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.run_timeout = timeout;
        self
    }

    /// Fix the seed used for jitter and tie-breaking
    #[must_use]
    pub fn rng_seed(mut self, seed: Option<u64>) -> Self {
        self.config.rng_seed = seed;
        self
    }

    #[must_use]
    pub fn dump_page_on_failure(mut self, dump: bool) -> Self {
        self.config.dump_page_on_failure = dump;
        self
    }
}
