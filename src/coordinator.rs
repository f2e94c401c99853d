//! Run coordination
//!
//! One run = one query against one endpoint: open a driver session, pull
//! records from the harvester, process each into a document, then judge the
//! error tally and optionally write the manifest. The session is closed on
//! every exit path.

use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{QuerySpec, ScrapeConfig};
use crate::driver::{DriverSession, SessionLauncher};
use crate::error::{ScrapeError, ScrapeResult};
use crate::harvest::{HarvestStats, Harvester, Termination};
use crate::processor::{ErrorTally, ItemProcessor, ManifestDocument, write_manifest};
use crate::utils::{GOOGLE_IMAGES_ENDPOINT, Pacer};

/// Search target of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    GoogleImages,
}

impl Endpoint {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GoogleImages => GOOGLE_IMAGES_ENDPOINT,
        }
    }
}

impl FromStr for Endpoint {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            GOOGLE_IMAGES_ENDPOINT => Ok(Self::GoogleImages),
            other => Err(ScrapeError::UnimplementedEndpoint(other.to_string())),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Load the caller's metadata object
///
/// A missing path or file is not an error: documents just carry no extra keys.
pub async fn load_metadata(path: Option<&Path>) -> ScrapeResult<Map<String, Value>> {
    let Some(path) = path.filter(|p| p.is_file()) else {
        warn!(
            "No metadata file found at {}; no host-level metadata will be included with results",
            path.map_or_else(|| "<none>".to_string(), |p| p.display().to_string())
        );
        return Ok(Map::new());
    };

    let text = tokio::fs::read_to_string(path).await?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(ScrapeError::Config(format!(
            "Metadata file {} must hold a JSON object, found {}",
            path.display(),
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub documents: Vec<ManifestDocument>,
    pub errors: ErrorTally,
    pub termination: Option<Termination>,
    pub stats: HarvestStats,
}

/// Sequences session, harvester and item processor for one query at a time
pub struct RunCoordinator<L> {
    config: ScrapeConfig,
    launcher: L,
}

impl<L: SessionLauncher> RunCoordinator<L> {
    pub fn new(config: ScrapeConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    #[must_use]
    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Run `query` against `endpoint`, merging `metadata` into every document
    ///
    /// The endpoint is validated before any browser is started.
    pub async fn run(
        &self,
        endpoint: &str,
        query: &QuerySpec,
        metadata: Map<String, Value>,
    ) -> ScrapeResult<RunOutcome> {
        let endpoint: Endpoint = endpoint.parse()?;
        let started = Instant::now();
        let deadline = self.config.run_timeout().map(|limit| started + limit);

        tokio::fs::create_dir_all(self.config.output_dir()).await?;

        let mut metadata = metadata;
        metadata.insert("endpoint".to_string(), Value::String(endpoint.name().to_string()));

        let processor = ItemProcessor::new(&self.config, query.term.clone())?;

        info!(
            "Starting {} run for '{}' ({} items, language {})",
            endpoint, query.term, query.desired_count, query.language
        );
        let mut session = self
            .launcher
            .open(self.config.browser(), &query.language)
            .await?;

        let harvested = self
            .collect(&session, query, &processor, &metadata, deadline)
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session cleanly: {}", e);
        }

        let outcome = harvested?;
        self.summarize(endpoint, query, &outcome, started);

        outcome.errors.check(
            query.desired_count,
            self.config.acceptable_error_rate(),
            self.config.error_rate_basis(),
        )?;

        if outcome.documents.is_empty() {
            return Err(ScrapeError::NoDocumentsReturned(endpoint.name().to_string()));
        }

        if self.config.write_manifest() {
            write_manifest(&self.config.manifest_path(), &outcome.documents).await?;
        }

        info!(
            "\"{}\" completed query against {}, images gathered here: {}",
            query.term,
            endpoint,
            self.config.output_dir().display()
        );
        Ok(outcome)
    }

    async fn collect(
        &self,
        session: &L::Session,
        query: &QuerySpec,
        processor: &ItemProcessor,
        metadata: &Map<String, Value>,
        deadline: Option<Instant>,
    ) -> ScrapeResult<RunOutcome> {
        let pacer = Pacer::new(self.config.interaction_delay(), self.config.make_rng());
        let dump_dir = self
            .config
            .dump_page_on_failure()
            .then(|| self.config.output_dir().to_path_buf());

        let mut harvester = Harvester::new(session, query.clone(), pacer)
            .with_deadline(deadline)
            .with_dump_dir(dump_dir);

        let mut documents = Vec::new();
        let mut errors = ErrorTally::new();

        while let Some(record) = harvester.next_record().await? {
            match processor.process(&record).await {
                Ok(mut document) => {
                    document.merge_metadata(metadata);
                    documents.push(document);
                    info!("{}: saved {}", documents.len(), record.url);
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", record.url, e);
                    errors.record(&e);
                }
            }
        }

        Ok(RunOutcome {
            documents,
            errors,
            termination: harvester.termination(),
            stats: harvester.stats().clone(),
        })
    }

    fn summarize(&self, endpoint: Endpoint, query: &QuerySpec, outcome: &RunOutcome, started: Instant) {
        info!(
            "Retrieved {} images for '{}' from {} with {} errors in {:.1}s ({:?})",
            outcome.documents.len(),
            query.term,
            endpoint,
            outcome.errors.total(),
            started.elapsed().as_secs_f64(),
            outcome.termination
        );
        if !outcome.errors.is_empty() {
            match serde_json::to_string_pretty(&outcome.errors) {
                Ok(json) => info!("Errors by kind: {}", json),
                Err(e) => warn!("Could not serialise error tally: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_google_images_is_implemented() {
        assert_eq!("google-images".parse::<Endpoint>().unwrap(), Endpoint::GoogleImages);
        let err = "bing-images".parse::<Endpoint>().unwrap_err();
        assert!(matches!(err, ScrapeError::UnimplementedEndpoint(name) if name == "bing-images"));
    }

    #[tokio::test]
    async fn missing_metadata_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = load_metadata(Some(&dir.path().join("absent.json"))).await.unwrap();
        assert!(metadata.is_empty());
        assert!(load_metadata(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn metadata_must_be_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = load_metadata(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Config(msg) if msg.contains("an array")));

        std::fs::write(&path, r#"{"host": "box-1"}"#).unwrap();
        let metadata = load_metadata(Some(&path)).await.unwrap();
        assert_eq!(metadata["host"], "box-1");
    }
}
