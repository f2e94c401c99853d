//! Manifest documents and the manifest file

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use super::download::UrlHeaders;
use super::storage::write_atomic;
use crate::error::{ScrapeError, ScrapeResult};

/// Keys owned by the document itself; caller metadata never replaces them
pub const RESERVED_KEYS: [&str; 6] = ["query", "image_id", "image_url", "alt", "headers", "related"];

/// A related image stored next to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub query: String,
    pub image_id: String,
    pub image_url: String,
    pub alt: String,
    pub headers: UrlHeaders,
    /// Same caller metadata as the parent document
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// One successfully downloaded result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub query: String,
    /// Content id; also the file stem of the stored image
    pub image_id: String,
    pub image_url: String,
    pub alt: String,
    pub headers: UrlHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<RelatedDocument>>,
    /// Caller-supplied metadata, flattened into the document
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ManifestDocument {
    /// Merge caller metadata into the document and its related entries
    ///
    /// Later values win for metadata keys; reserved document keys are kept.
    pub fn merge_metadata(&mut self, metadata: &Map<String, Value>) {
        let accepted: Vec<(&String, &Value)> = metadata
            .iter()
            .filter(|(key, _)| {
                let reserved = RESERVED_KEYS.contains(&key.as_str());
                if reserved {
                    warn!("Ignoring metadata key '{}': reserved by the manifest", key);
                }
                !reserved
            })
            .collect();

        let targets = std::iter::once(&mut self.metadata)
            .chain(self.related.iter_mut().flatten().map(|related| &mut related.metadata));
        for target in targets {
            for (key, value) in &accepted {
                target.insert((*key).clone(), (*value).clone());
            }
        }
    }
}

/// Write `documents` as a pretty-printed JSON array
pub async fn write_manifest(path: &Path, documents: &[ManifestDocument]) -> ScrapeResult<()> {
    let json = serde_json::to_vec_pretty(documents)?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&target, &json))
        .await
        .map_err(|e| ScrapeError::Io(std::io::Error::other(e)))??;

    info!("Wrote manifest with {} documents to {}", documents.len(), path.display());
    Ok(())
}
