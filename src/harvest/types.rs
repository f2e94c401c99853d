//! Site markup constants and result data structures
//!
//! Every selector the harvester uses against the results page lives here, so
//! markup drift on the target site is a one-file change.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::driver::Selector;

// =============================================================================
// Constants
// =============================================================================

/// Google search base URL; image results are selected with `tbm=isch`
pub const SEARCH_URL: &str = "https://www.google.com/search";

/// Clickable result previews in the results grid
pub const THUMBNAIL_SELECTOR: Selector = Selector::Css("img.Q4LuWd");

/// Enlarged image shown in the side panel after a thumbnail is clicked
pub const ENLARGED_IMAGE_SELECTOR: Selector = Selector::Css("img.n3VNCb");

/// Enlarged image markup used by some result types (shopping, news)
pub const ENLARGED_IMAGE_ALT_SELECTOR: Selector = Selector::Css("img.sFlh5c");

/// Previews in the "related images" strip of the side panel
pub const RELATED_IMAGE_SELECTOR: Selector = Selector::Css("div.Qf6UKe img.rg_i");

/// Gated "see more anyway" prompt, shown when results thin out
pub const SEE_MORE_ANYWAY_SELECTOR: Selector = Selector::Css(".r0zKGf");

/// Accept button of the cookie-consent interstitial
pub const COOKIE_ACCEPT_SELECTOR: Selector = Selector::XPath("//button[@jsname = 'b3VHJd']");

/// Unconditional "show more results" button at the end of the grid
pub const LOAD_MORE_SELECTOR: Selector = Selector::Css(".mye4qd");

/// Script scrolling the results document to its end
pub const SCROLL_TO_END_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Low-resolution CDN thumbnails shown while the real image is loading
static PLACEHOLDER_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://encrypted-tbn\d*\.gstatic\.com/").expect("Invalid placeholder URL regex")
});

/// Whether `url` points at the loading stand-in rather than the real image
#[must_use]
pub fn is_placeholder_url(url: &str) -> bool {
    PLACEHOLDER_URL.is_match(url)
}

/// Only absolute http(s) sources can be downloaded later
#[must_use]
pub fn is_fetchable_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

// =============================================================================
// Data Structures
// =============================================================================

/// Image extracted from the page: its source and alt text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateImage {
    pub url: String,
    pub alt: String,
}

/// A related image listed next to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    pub url: String,
    pub alt: String,
}

/// One harvested result
///
/// Identified by [`fingerprint`]; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub url: String,
    pub alt: String,
    /// Present only when related images are tracked
    pub related: Option<Vec<RelatedImage>>,
}

impl ResultRecord {
    #[must_use]
    pub fn new(candidate: CandidateImage, related: Option<Vec<RelatedImage>>) -> Self {
        Self {
            url: candidate.url,
            alt: candidate.alt,
            related,
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        fingerprint(&self.url, &self.alt)
    }
}

/// Deduplication key of a result: hash of its alt text and source URL
///
/// A unit separator keeps `("ab", "c")` and `("a", "bc")` apart.
#[must_use]
pub fn fingerprint(url: &str, alt: &str) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(alt.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(url.as_bytes());
    hasher.digest()
}
