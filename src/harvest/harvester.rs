//! Result harvesting state machine
//!
//! Drives one results page from navigation to exhaustion:
//!
//! ```text
//! Init -> Scrolling <-> Extracting <-> Advancing -> Done
//! ```
//!
//! Each iteration scrolls to the end of the grid, counts thumbnails, clicks
//! every thumbnail beyond the processed watermark, resolves the enlarged
//! image behind it, deduplicates by fingerprint and finally clears at most one
//! obstacle control before scrolling again.
//!
//! Records are pulled one at a time with [`Harvester::next_record`], so a
//! caller that has enough can simply stop pulling.

use futures::Stream;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::resolver::{Resolution, resolve_candidates};
use super::search_url::build_search_url;
use super::types::{
    COOKIE_ACCEPT_SELECTOR, ENLARGED_IMAGE_ALT_SELECTOR, ENLARGED_IMAGE_SELECTOR,
    LOAD_MORE_SELECTOR, RELATED_IMAGE_SELECTOR, RelatedImage, ResultRecord,
    SCROLL_TO_END_SCRIPT, SEE_MORE_ANYWAY_SELECTOR, THUMBNAIL_SELECTOR, is_fetchable_url,
};
use crate::config::QuerySpec;
use crate::driver::{
    DriverError, PageDriver, Selector, dump_page_source, get_page_url_with_fallback,
};
use crate::error::{ScrapeError, ScrapeResult};
use crate::utils::{MAX_EMPTY_ELEMENT_SKIPS, MAX_STAGNANT_ITERATIONS, PAGE_DUMP_FILE, Pacer};

/// Position of the harvester in its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    /// Not yet navigated
    Init,
    Scrolling,
    /// Walking thumbnails between the watermark and the current count
    Extracting,
    /// Clearing an obstacle control before the next scroll
    Advancing,
    Done,
}

/// Why harvesting stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The desired number of distinct records was produced
    TargetMet,
    /// The grid stopped growing
    Exhausted,
    /// The run deadline passed between iterations
    Deadline,
}

/// Page control that must be clicked to reveal more results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstacle {
    SeeMoreAnyway,
    CookieConsent,
    LoadMore,
}

impl Obstacle {
    /// Strict priority order in which obstacles are looked for
    pub const PRIORITY: [Obstacle; 3] = [Self::SeeMoreAnyway, Self::CookieConsent, Self::LoadMore];

    #[must_use]
    pub fn selector(self) -> Selector {
        match self {
            Self::SeeMoreAnyway => SEE_MORE_ANYWAY_SELECTOR,
            Self::CookieConsent => COOKIE_ACCEPT_SELECTOR,
            Self::LoadMore => LOAD_MORE_SELECTOR,
        }
    }

    /// Pause after clicking, in multiples of the base interval
    fn settle_scale(self) -> f64 {
        match self {
            // loads a whole new batch of results
            Self::LoadMore => 10.0,
            Self::SeeMoreAnyway | Self::CookieConsent => 1.0,
        }
    }
}

/// Counters describing one harvest, for logging and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub iterations: u32,
    pub stagnant_iterations: u32,
    pub thumbnails_seen: usize,
    pub click_failures: u32,
    pub empty_skips: u32,
    pub duplicates: u32,
    pub obstacles_cleared: u32,
}

/// Pull-based producer of distinct [`ResultRecord`]s for one query
///
/// Finite and not restartable: once [`next_record`](Self::next_record) has
/// returned `Ok(None)` or an error, the harvester is spent.
pub struct Harvester<'d, D: PageDriver, R: Rng> {
    driver: &'d D,
    query: QuerySpec,
    pacer: Pacer<R>,
    state: HarvestState,
    termination: Option<Termination>,
    seen: HashSet<u64>,
    /// Thumbnails below this index were processed in an earlier iteration
    watermark: usize,
    cursor: usize,
    thumbnail_count: usize,
    last_count: usize,
    stagnant: u32,
    deadline: Option<Instant>,
    dump_dir: Option<PathBuf>,
    stats: HarvestStats,
}

impl<'d, D: PageDriver, R: Rng> Harvester<'d, D, R> {
    pub fn new(driver: &'d D, query: QuerySpec, pacer: Pacer<R>) -> Self {
        Self {
            driver,
            query,
            pacer,
            state: HarvestState::Init,
            termination: None,
            seen: HashSet::new(),
            watermark: 0,
            cursor: 0,
            thumbnail_count: 0,
            last_count: 0,
            stagnant: 0,
            deadline: None,
            dump_dir: None,
            stats: HarvestStats::default(),
        }
    }

    /// Stop gracefully once `deadline` has passed
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Save the page source here when the markup appears to have drifted
    #[must_use]
    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }

    #[must_use]
    pub fn state(&self) -> HarvestState {
        self.state
    }

    #[must_use]
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    #[must_use]
    pub fn stats(&self) -> &HarvestStats {
        &self.stats
    }

    /// Number of distinct records produced so far
    #[must_use]
    pub fn yielded(&self) -> usize {
        self.seen.len()
    }

    /// Advance until the next distinct record, or `None` once done
    pub async fn next_record(&mut self) -> ScrapeResult<Option<ResultRecord>> {
        loop {
            match self.state {
                HarvestState::Init => self.start().await?,
                HarvestState::Scrolling => self.scroll().await?,
                HarvestState::Extracting => {
                    if self.cursor >= self.thumbnail_count {
                        self.state = HarvestState::Advancing;
                        continue;
                    }
                    let index = self.cursor;
                    self.cursor += 1;

                    let Some(record) = self.extract_at(index).await? else {
                        continue;
                    };
                    if !self.seen.insert(record.fingerprint()) {
                        self.stats.duplicates += 1;
                        debug!("Discarding duplicate result {}", record.url);
                        continue;
                    }
                    if self.seen.len() >= self.query.desired_count {
                        self.finish(Termination::TargetMet);
                    }
                    return Ok(Some(record));
                }
                HarvestState::Advancing => {
                    self.clear_obstacle().await?;
                    self.watermark = self.thumbnail_count;
                    self.state = HarvestState::Scrolling;
                }
                HarvestState::Done => return Ok(None),
            }
        }
    }

    /// Adapt into a stream that ends after the last record or the first error
    pub fn into_stream(self) -> impl Stream<Item = ScrapeResult<ResultRecord>> + 'd
    where
        R: 'd,
    {
        futures::stream::unfold(Some(self), |harvester| async move {
            let mut harvester = harvester?;
            match harvester.next_record().await {
                Ok(Some(record)) => Some((Ok(record), Some(harvester))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn finish(&mut self, reason: Termination) {
        info!(
            "Harvest finished ({:?}) with {} records after {} iterations",
            reason,
            self.seen.len(),
            self.stats.iterations
        );
        self.termination = Some(reason);
        self.state = HarvestState::Done;
    }

    async fn start(&mut self) -> ScrapeResult<()> {
        if self.query.desired_count == 0 {
            self.finish(Termination::TargetMet);
            return Ok(());
        }

        let url = build_search_url(&self.query)?;
        info!("Navigating to image search for '{}'", self.query.search_term());
        debug!("Search URL: {}", url);
        self.driver.navigate(url.as_str()).await?;
        self.pacer.pause(1.0).await;
        self.state = HarvestState::Scrolling;
        Ok(())
    }

    async fn scroll(&mut self) -> ScrapeResult<()> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!("Run deadline reached; stopping harvest early");
            self.finish(Termination::Deadline);
            return Ok(());
        }

        if let Err(e) = self.driver.run_script(SCROLL_TO_END_SCRIPT).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            debug!("Scroll script failed: {}", e);
        }
        self.pacer.pause(1.0).await;

        let count = match self.driver.find_all(THUMBNAIL_SELECTOR).await {
            Ok(thumbnails) => thumbnails.len(),
            Err(e) if e.is_fatal() => return Err(e.into()),
            // grid re-rendered mid-query; counts as an iteration without growth
            Err(e) => {
                debug!("Thumbnail listing failed: {}", e);
                self.last_count
            }
        };
        self.stats.iterations += 1;

        if count == self.last_count {
            self.stagnant += 1;
            self.stats.stagnant_iterations += 1;
            debug!(
                "No new thumbnails ({} total), stagnant iteration {}/{}",
                count, self.stagnant, MAX_STAGNANT_ITERATIONS
            );
            if self.stagnant >= MAX_STAGNANT_ITERATIONS {
                self.finish(Termination::Exhausted);
                return Ok(());
            }
        } else {
            self.stagnant = 0;
            debug!("Thumbnail count {} -> {}", self.last_count, count);
        }

        self.last_count = count;
        self.thumbnail_count = count;
        self.stats.thumbnails_seen = count;
        self.cursor = self.watermark.min(count);
        self.state = HarvestState::Extracting;
        Ok(())
    }

    /// Click the thumbnail at `index` and build its record
    ///
    /// Handles are re-queried for every thumbnail; earlier clicks may have
    /// re-rendered the grid.
    async fn extract_at(&mut self, index: usize) -> ScrapeResult<Option<ResultRecord>> {
        let driver = self.driver;
        let thumbnails = match driver.find_all(THUMBNAIL_SELECTOR).await {
            Ok(thumbnails) => thumbnails,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                debug!("Skipping thumbnail {}: listing failed: {}", index, e);
                return Ok(None);
            }
        };
        let Some(thumbnail) = thumbnails.get(index) else {
            debug!("Thumbnail {} vanished before it could be clicked", index);
            return Ok(None);
        };

        if let Err(e) = driver.click(thumbnail).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            self.stats.click_failures += 1;
            debug!("Skipping thumbnail {}: {}", index, e);
            return Ok(None);
        }
        drop(thumbnails);
        self.pacer.pause(1.0).await;

        let candidate = match self.resolve_enlarged().await? {
            Resolution::Resolved(candidate) => candidate,
            Resolution::NoCandidate => {
                self.stats.empty_skips += 1;
                warn!(
                    "No enlarged image behind thumbnail {} ({}/{} empty skips)",
                    index, self.stats.empty_skips, MAX_EMPTY_ELEMENT_SKIPS
                );
                if self.stats.empty_skips >= MAX_EMPTY_ELEMENT_SKIPS {
                    return Err(self.markup_drift().await);
                }
                return Ok(None);
            }
        };

        let related = if self.query.track_related {
            Some(self.collect_related().await?)
        } else {
            None
        };

        Ok(Some(ResultRecord::new(candidate, related)))
    }

    /// Resolve against the primary enlarged-image markup, then the alternate
    async fn resolve_enlarged(&mut self) -> Result<Resolution, DriverError> {
        let driver = self.driver;
        for selector in [ENLARGED_IMAGE_SELECTOR, ENLARGED_IMAGE_ALT_SELECTOR] {
            let handles = match driver.find_all(selector).await {
                Ok(handles) => handles,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("Lookup of {} failed: {}", selector.as_str(), e);
                    continue;
                }
            };
            let resolution = resolve_candidates(driver, handles, self.pacer.rng()).await?;
            if resolution.is_resolved() {
                return Ok(resolution);
            }
        }
        Ok(Resolution::NoCandidate)
    }

    /// Best effort: unreadable related elements are left out
    async fn collect_related(&mut self) -> Result<Vec<RelatedImage>, DriverError> {
        let driver = self.driver;
        let handles = match driver.find_all(RELATED_IMAGE_SELECTOR).await {
            Ok(handles) => handles,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Related images unavailable: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut related = Vec::with_capacity(handles.len());
        for handle in &handles {
            let url = match driver.attribute(handle, "src").await {
                Ok(Some(url)) if is_fetchable_url(&url) => url,
                Ok(_) => continue,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("Skipping related image: {}", e);
                    continue;
                }
            };
            let alt = match driver.attribute(handle, "alt").await {
                Ok(alt) => alt.unwrap_or_default(),
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => continue,
            };
            related.push(RelatedImage { url, alt });
        }
        Ok(related)
    }

    /// Click the first obstacle found in priority order; finding none is fine
    async fn clear_obstacle(&mut self) -> ScrapeResult<Option<Obstacle>> {
        let driver = self.driver;
        for obstacle in Obstacle::PRIORITY {
            let handle = match driver.find_one(obstacle.selector()).await {
                Ok(Some(handle)) => handle,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    debug!("Lookup of {:?} failed: {}", obstacle, e);
                    continue;
                }
            };

            return match driver.click(&handle).await {
                Ok(()) => {
                    debug!("Cleared {:?}", obstacle);
                    self.stats.obstacles_cleared += 1;
                    self.pacer.pause(obstacle.settle_scale()).await;
                    Ok(Some(obstacle))
                }
                Err(e) if e.is_fatal() => Err(e.into()),
                Err(e) => {
                    debug!("{:?} present but not clickable: {}", obstacle, e);
                    Ok(None)
                }
            };
        }
        Ok(None)
    }

    async fn markup_drift(&mut self) -> ScrapeError {
        let url = get_page_url_with_fallback(self.driver).await;
        warn!("Enlarged-image selectors no longer match on {}", url);

        let page_dump = match &self.dump_dir {
            Some(dir) => dump_page_source(self.driver, dir, PAGE_DUMP_FILE).await,
            None => None,
        };
        self.state = HarvestState::Done;

        ScrapeError::TooManyEmptyElements {
            skipped: self.stats.empty_skips,
            page_dump,
        }
    }
}
