pub mod browser_setup;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod harvest;
pub mod processor;
pub mod utils;

pub use browser_setup::{
    apply_stealth_measures, connect_browser, download_managed_browser, find_browser_executable,
    launch_browser,
};
pub use config::{
    BrowserConfig, BrowserFamily, ErrorRateBasis, QuerySpec, ScrapeConfig, ScrapeConfigBuilder,
};
pub use coordinator::{Endpoint, RunCoordinator, RunOutcome, load_metadata};
pub use driver::{
    ChromeSession, ChromiumLauncher, DriverError, DriverSession, PageDriver, Selector,
    SessionLauncher,
};
pub use error::{ScrapeError, ScrapeResult};
pub use harvest::{
    CandidateImage, HarvestState, HarvestStats, Harvester, RelatedImage, Resolution, ResultRecord,
    Termination, build_search_url, fingerprint, select_best,
};
pub use processor::{
    ErrorTally, ItemError, ItemProcessor, ManifestDocument, RelatedDocument, UrlHeaders, content_id,
};
pub use utils::Pacer;
