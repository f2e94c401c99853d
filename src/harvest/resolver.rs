//! Best-candidate resolution
//!
//! After a thumbnail is clicked the page may show zero, one or several
//! elements that look like the enlarged image: the real one, a placeholder
//! still loading from the thumbnail CDN, or leftovers from the previous
//! result. The resolver inspects them and picks one.

use rand::Rng;
use tracing::{debug, trace};

use super::types::{CandidateImage, is_fetchable_url, is_placeholder_url};
use crate::driver::{DriverError, PageDriver};

/// Outcome of resolving the enlarged image behind a thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(CandidateImage),
    /// Nothing usable was found; the caller may try another selector
    NoCandidate,
}

impl Resolution {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Pick the best of the inspected candidates
///
/// `None` entries are elements that went stale while being inspected: they are
/// skipped, neither penalized nor disqualifying. With two or more candidates
/// each scores 1, minus 1 for a placeholder URL; ties at the maximum are
/// broken uniformly at random with `rng`.
pub fn select_best<R: Rng>(
    inspected: Vec<Option<CandidateImage>>,
    rng: &mut R,
) -> Resolution {
    if inspected.len() == 1 {
        return match inspected.into_iter().next().flatten() {
            Some(candidate) => Resolution::Resolved(candidate),
            None => Resolution::NoCandidate,
        };
    }

    let scored: Vec<(i32, CandidateImage)> = inspected
        .into_iter()
        .flatten()
        .map(|candidate| {
            let score = if is_placeholder_url(&candidate.url) { 0 } else { 1 };
            (score, candidate)
        })
        .collect();

    let Some(best) = scored.iter().map(|(score, _)| *score).max() else {
        return Resolution::NoCandidate;
    };

    let mut tied: Vec<CandidateImage> = scored
        .into_iter()
        .filter(|(score, _)| *score == best)
        .map(|(_, candidate)| candidate)
        .collect();

    let pick = rng.random_range(0..tied.len());
    trace!("Tie-break among {} candidates picked #{}", tied.len(), pick);
    Resolution::Resolved(tied.swap_remove(pick))
}

/// Read `src` and `alt` of every handle, then [`select_best`]
///
/// Stale or otherwise unreadable elements become skipped entries; an element
/// without an http(s) source has nothing to download and is skipped the same
/// way. Only a closed session is an error.
///
/// Filtering happens before selection, so a single handle is not returned
/// unconditionally: one whose source is inline (`data:`) or missing yields
/// [`Resolution::NoCandidate`] rather than a record that cannot be fetched.
pub async fn resolve_candidates<D, R>(
    driver: &D,
    handles: Vec<D::Handle>,
    rng: &mut R,
) -> Result<Resolution, DriverError>
where
    D: PageDriver,
    R: Rng,
{
    if handles.is_empty() {
        return Ok(Resolution::NoCandidate);
    }

    let mut inspected = Vec::with_capacity(handles.len());
    for handle in &handles {
        inspected.push(inspect(driver, handle).await?);
    }

    Ok(select_best(inspected, rng))
}

async fn inspect<D: PageDriver>(
    driver: &D,
    handle: &D::Handle,
) -> Result<Option<CandidateImage>, DriverError> {
    let src = match driver.attribute(handle, "src").await {
        Ok(Some(src)) if is_fetchable_url(&src) => src,
        Ok(_) => return Ok(None),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!("Skipping candidate: {}", e);
            return Ok(None);
        }
    };

    let alt = match driver.attribute(handle, "alt").await {
        Ok(alt) => alt.unwrap_or_default(),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!("Skipping candidate after reading src: {}", e);
            return Ok(None);
        }
    };

    Ok(Some(CandidateImage { url: src, alt }))
}
