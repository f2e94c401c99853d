//! Browser driver abstraction
//!
//! The harvester talks to the results page only through [`PageDriver`], a
//! small capability interface: navigate, run a script, locate elements by CSS
//! or XPath, click, read attributes. [`ChromeSession`] implements it over
//! chromiumoxide; tests implement it over a simulated page.
//!
//! Element handles are ephemeral. Any page mutation (scrolling, re-render)
//! may invalidate them, which surfaces as [`DriverError::StaleElement`].

mod page_helpers;
mod session;

pub use page_helpers::{dump_page_source, get_page_url_with_fallback};
pub use session::{ChromeSession, ChromiumLauncher};

use thiserror::Error;

use crate::config::BrowserConfig;
use crate::error::ScrapeResult;

/// Element lookup expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(&'static str),
    XPath(&'static str),
}

impl Selector {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Css(s) | Self::XPath(s) => s,
        }
    }
}

/// Failures reported by a driver primitive
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The element was detached or replaced since it was located
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// The element exists but cannot receive a click (overlay, not visible)
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script execution failed: {0}")]
    Script(String),

    /// The browser or page has gone away
    #[error("Browser session closed: {0}")]
    SessionClosed(String),

    #[error("Driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Classify a raw driver error message
    ///
    /// CDP reports detached nodes and closed targets only through message
    /// text, so classification is by pattern.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("could not find node")
            || lower.contains("no node with given id")
            || lower.contains("node is detached")
            || lower.contains("node with given id does not belong")
            || lower.contains("cannot find context with specified id")
            || lower.contains("stale")
        {
            return Self::StaleElement(message);
        }

        if lower.contains("not visible")
            || lower.contains("not an htmlelement")
            || lower.contains("no clickable point")
            || lower.contains("not interactable")
        {
            return Self::NotInteractable(message);
        }

        if lower.contains("browser closed")
            || lower.contains("target closed")
            || lower.contains("session closed")
            || lower.contains("no response from the chromium instance")
            || lower.contains("channel")
            || lower.contains("websocket")
        {
            return Self::SessionClosed(message);
        }

        Self::Protocol(message)
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement(_))
    }

    /// Whether the session can no longer be used at all
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionClosed(_))
    }
}

/// Capability interface over one browser page
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Reference to a located element, valid for one interaction cycle
    type Handle;

    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn run_script(&self, js: &str) -> Result<(), DriverError>;

    /// All elements matching `selector`, in document order; empty when none match
    async fn find_all(&self, selector: Selector) -> Result<Vec<Self::Handle>, DriverError>;

    /// First element matching `selector`, if any
    async fn find_one(&self, selector: Selector) -> Result<Option<Self::Handle>, DriverError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn click(&self, handle: &Self::Handle) -> Result<(), DriverError>;

    async fn attribute(
        &self,
        handle: &Self::Handle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Full HTML of the current document
    async fn page_source(&self) -> Result<String, DriverError>;

    /// Current document URL, when known
    async fn current_url(&self) -> Result<Option<String>, DriverError>;
}

/// A page driver owning its browser process
///
/// `close` releases the browser and is idempotent.
#[allow(async_fn_in_trait)]
pub trait DriverSession: PageDriver {
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens one driver session per run
#[allow(async_fn_in_trait)]
pub trait SessionLauncher {
    type Session: DriverSession;

    /// `language` is the query language, advertised by the page's navigator
    async fn open(&self, config: &BrowserConfig, language: &str) -> ScrapeResult<Self::Session>;
}
