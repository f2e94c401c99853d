//! Getter methods for `ScrapeConfig`

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::types::{BrowserConfig, ErrorRateBasis, ScrapeConfig};

impl ScrapeConfig {
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Subdirectory receiving related-image files
    #[must_use]
    pub fn related_dir(&self) -> PathBuf {
        self.output_dir.join("related")
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join("manifest.json")
    }

    #[must_use]
    pub fn browser(&self) -> &BrowserConfig {
        &self.browser
    }

    #[must_use]
    pub fn interaction_delay(&self) -> Duration {
        self.interaction_delay
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    #[must_use]
    pub fn header_timeout(&self) -> Duration {
        self.header_timeout
    }

    #[must_use]
    pub fn acceptable_error_rate(&self) -> f64 {
        self.acceptable_error_rate
    }

    #[must_use]
    pub fn error_rate_basis(&self) -> ErrorRateBasis {
        self.error_rate_basis
    }

    #[must_use]
    pub fn compress_dimensions(&self) -> Option<(u32, u32)> {
        self.compress_dimensions
    }

    #[must_use]
    pub fn write_manifest(&self) -> bool {
        self.write_manifest
    }

    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout
    }

    #[must_use]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    #[must_use]
    pub fn dump_page_on_failure(&self) -> bool {
        self.dump_page_on_failure
    }

    /// Randomness source for one run, seeded when a seed is configured
    #[must_use]
    pub fn make_rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
