//! Image search URL construction

use url::Url;

use super::types::SEARCH_URL;
use crate::config::QuerySpec;
use crate::error::{ScrapeError, ScrapeResult};

/// Build the image-search URL for `query`
///
/// Caller-supplied extra parameters are appended after the defaults and
/// replace any default of the same name.
pub fn build_search_url(query: &QuerySpec) -> ScrapeResult<Url> {
    let mut url = Url::parse(SEARCH_URL)
        .map_err(|e| ScrapeError::Config(format!("Invalid search base URL: {e}")))?;

    let term = query.search_term();
    let mut params: Vec<(String, String)> = vec![
        ("safe".into(), "off".into()),
        ("site".into(), String::new()),
        ("tbm".into(), "isch".into()),
        ("source".into(), "hp".into()),
        ("q".into(), term.clone()),
        ("oq".into(), term),
        ("gs_l".into(), "img".into()),
        ("lr".into(), format!("lang_{}", query.language)),
    ];

    for (key, value) in &query.extra_params {
        match params.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1.clone_from(value),
            None => params.push((key.clone(), value.clone())),
        }
    }

    url.query_pairs_mut().extend_pairs(params);
    Ok(url)
}
