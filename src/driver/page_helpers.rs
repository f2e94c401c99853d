//! Helper functions for diagnostic page access
//!
//! These helpers never fail: they are used on paths that are already
//! reporting another error, so a second failure is logged and swallowed.

use std::path::{Path, PathBuf};
use tracing::{trace, warn};

use super::PageDriver;

/// Get page URL with diagnostic fallback
///
/// Returns `"about:blank"` on any failure so logs never show an empty URL.
pub async fn get_page_url_with_fallback<D: PageDriver>(driver: &D) -> String {
    match driver.current_url().await {
        Ok(Some(url)) => url,
        Ok(None) => {
            trace!("Page URL is None (page not yet navigated)");
            "about:blank".to_string()
        }
        Err(e) => {
            trace!("Failed to get page URL (browser communication error): {}", e);
            "about:blank".to_string()
        }
    }
}

/// Save the current page source for offline inspection
///
/// Returns the written path, or `None` when the source could not be read or
/// written.
pub async fn dump_page_source<D: PageDriver>(
    driver: &D,
    dir: &Path,
    file_name: &str,
) -> Option<PathBuf> {
    let html = match driver.page_source().await {
        Ok(html) => html,
        Err(e) => {
            trace!("Failed to get page content for debugging: {}", e);
            return None;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Failed to create dump directory {}: {}", dir.display(), e);
        return None;
    }

    let path = dir.join(file_name);
    match tokio::fs::write(&path, &html).await {
        Ok(()) => {
            warn!(
                "Saved page source ({} bytes) to {}",
                html.len(),
                path.display()
            );
            Some(path)
        }
        Err(e) => {
            warn!("Failed to write page dump to {}: {}", path.display(), e);
            None
        }
    }
}
