//! Query specification for one harvesting run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to search for and how many results to gather
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub term: String,
    /// Language code (e.g. `en`), sent as `lr=lang_<code>`
    pub language: String,
    /// Wrap the term in quotes so the engine matches it verbatim
    pub exact_match: bool,
    /// Additional query parameters merged into the search URL
    pub extra_params: BTreeMap<String, String>,
    pub desired_count: usize,
    /// Collect the related-images panel for every result
    pub track_related: bool,
}

impl QuerySpec {
    #[must_use]
    pub fn new(term: impl Into<String>, desired_count: usize) -> Self {
        Self {
            term: term.into(),
            language: "en".to_string(),
            exact_match: false,
            extra_params: BTreeMap::new(),
            desired_count,
            track_related: false,
        }
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn exact_match(mut self, exact: bool) -> Self {
        self.exact_match = exact;
        self
    }

    #[must_use]
    pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn extra_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.extra_params.extend(params);
        self
    }

    #[must_use]
    pub fn track_related(mut self, track: bool) -> Self {
        self.track_related = track;
        self
    }

    /// Term as submitted to the engine
    #[must_use]
    pub fn search_term(&self) -> String {
        if self.exact_match {
            format!("\"{}\"", self.term)
        } else {
            self.term.clone()
        }
    }
}
