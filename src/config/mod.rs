//! Configuration module for harvesting runs
//!
//! This module provides the `ScrapeConfig` struct and its type-safe builder,
//! the browser settings handed to the driver session, and the per-run
//! `QuerySpec`.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod query;
pub mod types;

// Re-exports for public API
pub use builder::{ScrapeConfigBuilder, WithOutputDir};
pub use query::QuerySpec;
pub use types::{BrowserConfig, BrowserFamily, ErrorRateBasis, ScrapeConfig};
