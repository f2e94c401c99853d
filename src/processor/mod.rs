//! Per-item post-processing
//!
//! For every harvested record: download, hash, persist, fetch headers and
//! package a [`ManifestDocument`]. Failures are per item; the run keeps an
//! [`ErrorTally`] and judges it once at the end.

pub mod download;
pub mod fingerprint;
pub mod manifest;
pub mod storage;

pub use download::{Downloader, ItemError, UrlHeaders, parse_http_date_millis};
pub use fingerprint::{average_hash, color_hash, content_id, perceptual_signature};
pub use manifest::{ManifestDocument, RESERVED_KEYS, RelatedDocument, write_manifest};
pub use storage::{StoredImage, store_image, write_atomic};

use serde::Serialize;
use serde_json::Map;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{ErrorRateBasis, ScrapeConfig};
use crate::error::{ScrapeError, ScrapeResult};
use crate::harvest::{RelatedImage, ResultRecord};

/// Turns harvested records into stored images and manifest documents
#[derive(Debug, Clone)]
pub struct ItemProcessor {
    downloader: Downloader,
    query: String,
    output_dir: PathBuf,
    related_dir: PathBuf,
    compress_to: Option<(u32, u32)>,
}

impl ItemProcessor {
    pub fn new(config: &ScrapeConfig, query: impl Into<String>) -> ScrapeResult<Self> {
        Ok(Self {
            downloader: Downloader::new(config.download_timeout(), config.header_timeout())?,
            query: query.into(),
            output_dir: config.output_dir().to_path_buf(),
            related_dir: config.related_dir(),
            compress_to: config.compress_dimensions(),
        })
    }

    /// Process one record into a document
    ///
    /// Related images are best effort: one that fails is logged and left out
    /// of the parent's `related` list.
    pub async fn process(&self, record: &ResultRecord) -> Result<ManifestDocument, ItemError> {
        let stored = self.persist(&record.url, &self.output_dir).await?;
        let headers = self.downloader.fetch_headers(&record.url).await;

        let related = match &record.related {
            Some(images) => Some(self.process_related(images).await),
            None => None,
        };

        Ok(ManifestDocument {
            query: self.query.clone(),
            image_id: stored.image_id,
            image_url: record.url.clone(),
            alt: record.alt.clone(),
            headers,
            related,
            metadata: Map::new(),
        })
    }

    async fn process_related(&self, images: &[RelatedImage]) -> Vec<RelatedDocument> {
        let mut documents = Vec::with_capacity(images.len());
        for image in images {
            match self.persist(&image.url, &self.related_dir).await {
                Ok(stored) => documents.push(RelatedDocument {
                    query: self.query.clone(),
                    image_id: stored.image_id,
                    image_url: image.url.clone(),
                    alt: image.alt.clone(),
                    headers: self.downloader.fetch_headers(&image.url).await,
                    metadata: Map::new(),
                }),
                Err(e) => warn!("Skipping related image {}: {}", image.url, e),
            }
        }
        documents
    }

    async fn persist(&self, url: &str, dir: &Path) -> Result<StoredImage, ItemError> {
        let bytes = self.downloader.fetch_bytes(url).await?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);

        let url = url.to_string();
        let dir = dir.to_path_buf();
        let compress_to = self.compress_to;
        tokio::task::spawn_blocking(move || store_image(&bytes, &url, &dir, compress_to))
            .await
            .map_err(|e| ItemError::Task(e.to_string()))?
    }
}

/// Per-run count of item failures by error kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorTally {
    counts: BTreeMap<String, usize>,
}

impl ErrorTally {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: &ItemError) {
        self.record_kind(error.kind());
    }

    pub fn record_kind(&mut self, kind: &str) {
        *self.counts.entry(kind.to_string()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total failed items
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    #[must_use]
    pub fn distinct_kinds(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    /// Error rate relative to the number of items requested
    #[must_use]
    pub fn rate(&self, max_items: usize, basis: ErrorRateBasis) -> f64 {
        let numerator = match basis {
            ErrorRateBasis::DistinctKinds => self.distinct_kinds(),
            ErrorRateBasis::Occurrences => self.total(),
        };
        numerator as f64 / max_items.max(1) as f64
    }

    /// Fail when the rate strictly exceeds `acceptable`
    pub fn check(&self, max_items: usize, acceptable: f64, basis: ErrorRateBasis) -> ScrapeResult<()> {
        let rate = self.rate(max_items, basis);
        if rate > acceptable {
            return Err(ScrapeError::UnacceptableErrorRate {
                rate,
                acceptable,
                tally: self.counts.clone(),
            });
        }
        Ok(())
    }
}
