//! Image result harvesting
//!
//! Everything that knows about the results page: its selectors, how the
//! enlarged image behind a thumbnail is chosen, and the loop that walks the
//! grid until enough distinct results are found or the page runs dry.

pub mod harvester;
pub mod resolver;
pub mod search_url;
pub mod types;

pub use harvester::{HarvestState, HarvestStats, Harvester, Obstacle, Termination};
pub use resolver::{Resolution, resolve_candidates, select_best};
pub use search_url::build_search_url;
pub use types::{
    CandidateImage, RelatedImage, ResultRecord, fingerprint, is_fetchable_url, is_placeholder_url,
};
