//! Shared configuration constants
//!
//! Default values used across the crate, kept here to avoid magic numbers.

/// Chrome user agent string for stealth mode
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Consecutive iterations without new thumbnails before the page counts as exhausted
pub const MAX_STAGNANT_ITERATIONS: u32 = 5;

/// Thumbnails with no resolvable image tolerated in one run before giving up
pub const MAX_EMPTY_ELEMENT_SKIPS: u32 = 10;

/// JPEG quality for persisted images
pub const JPEG_QUALITY: u8 = 85;

/// Endpoint name of the only implemented search target
pub const GOOGLE_IMAGES_ENDPOINT: &str = "google-images";

/// File written next to the images when the page markup drifts
pub const PAGE_DUMP_FILE: &str = "page_dump.html";
