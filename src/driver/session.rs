//! chromiumoxide-backed driver session
//!
//! One session owns one browser (launched or connected) and one page. The
//! browser process is released by `close()` on every exit path; `Drop` is the
//! fallback when a caller forgets.

use chromiumoxide::browser::Browser;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DriverError, DriverSession, PageDriver, SessionLauncher, Selector};
use crate::browser_setup::{apply_stealth_measures, connect_browser, launch_browser};
use crate::config::BrowserConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::utils::with_timeout;

/// Browser plus the task pumping its CDP event stream
///
/// The handler MUST be aborted when the browser goes away, otherwise it keeps
/// running after the process has exited.
struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
    /// Launched by us, as opposed to attached to a remote endpoint
    owns_process: bool,
}

impl BrowserWrapper {
    /// Remove the profile directory
    ///
    /// MUST run after `browser.wait()` so Chrome has released its file handles.
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        debug!("Dropping BrowserWrapper - aborting handler task");
        self.handler.abort();
        if self.user_data_dir.is_some() {
            warn!("BrowserWrapper dropped without explicit close - removing temp dir in Drop");
            self.cleanup_temp_dir();
        }
    }
}

/// Opens chromiumoxide sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl SessionLauncher for ChromiumLauncher {
    type Session = ChromeSession;

    async fn open(&self, config: &BrowserConfig, language: &str) -> ScrapeResult<ChromeSession> {
        ChromeSession::open(config, language).await
    }
}

/// Driver session over one chromiumoxide page
pub struct ChromeSession {
    wrapper: Option<BrowserWrapper>,
    page: Page,
    request_timeout: Duration,
}

impl ChromeSession {
    /// Launch or connect a browser and prepare a blank, stealth-patched page
    pub async fn open(config: &BrowserConfig, language: &str) -> ScrapeResult<Self> {
        let wrapper = match &config.remote_endpoint {
            Some(endpoint) => {
                let (browser, handler) = connect_browser(endpoint).await?;
                BrowserWrapper {
                    browser,
                    handler,
                    user_data_dir: None,
                    owns_process: false,
                }
            }
            None => {
                let (browser, handler, user_data_dir) = launch_browser(config).await?;
                BrowserWrapper {
                    browser,
                    handler,
                    user_data_dir: Some(user_data_dir),
                    owns_process: true,
                }
            }
        };

        let page = match wrapper.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = shutdown_wrapper(wrapper).await;
                return Err(ScrapeError::Browser(format!("Failed to create blank page: {e}")));
            }
        };

        match with_timeout(apply_stealth_measures(&page, language), Duration::from_secs(5)).await {
            Ok(Ok(())) => debug!("Stealth injection complete"),
            Ok(Err(e)) => warn!("Stealth injection failed: {}", e),
            Err(_) => warn!("Stealth injection timeout"),
        }

        Ok(Self {
            wrapper: Some(wrapper),
            page,
            request_timeout: config.request_timeout,
        })
    }
}

/// Close a launched browser, wait for its exit and remove its profile
///
/// Attached (remote) browsers are left running; only the connection is dropped.
async fn shutdown_wrapper(mut wrapper: BrowserWrapper) -> Result<(), DriverError> {
    let mut first_error = None;
    if wrapper.owns_process {
        info!("Closing browser");
        if let Err(e) = wrapper.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
            first_error.get_or_insert(DriverError::classify(e.to_string()));
        }
        if let Err(e) = wrapper.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        wrapper.cleanup_temp_dir();
    }
    drop(wrapper);

    first_error.map_or(Ok(()), Err)
}

fn driver_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::classify(e.to_string())
}

impl PageDriver for ChromeSession {
    type Handle = Element;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let load = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            Ok(())
        };

        with_timeout(load, self.request_timeout)
            .await
            .map_err(|elapsed| {
                DriverError::Navigation(format!("{url} did not load within {:?}", elapsed.after))
            })?
    }

    async fn run_script(&self, js: &str) -> Result<(), DriverError> {
        self.page
            .evaluate(js)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn find_all(&self, selector: Selector) -> Result<Vec<Element>, DriverError> {
        let found = match selector {
            Selector::Css(css) => self.page.find_elements(css).await,
            Selector::XPath(xpath) => self.page.find_xpaths(xpath).await,
        };

        match found {
            Ok(elements) => Ok(elements),
            Err(e) => {
                let message = e.to_string();
                let lower = message.to_lowercase();
                if lower.contains("not found") || lower.contains("could not find") {
                    Ok(Vec::new())
                } else {
                    Err(DriverError::classify(message))
                }
            }
        }
    }

    async fn click(&self, handle: &Element) -> Result<(), DriverError> {
        handle.click().await.map(|_| ()).map_err(driver_error)
    }

    async fn attribute(&self, handle: &Element, name: &str) -> Result<Option<String>, DriverError> {
        handle.attribute(name).await.map_err(driver_error)
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(driver_error)
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        self.page.url().await.map_err(driver_error)
    }
}

impl DriverSession for ChromeSession {
    async fn close(&mut self) -> Result<(), DriverError> {
        let Some(wrapper) = self.wrapper.take() else {
            return Ok(());
        };
        if let Err(e) = self.page.clone().close().await {
            debug!("Page close failed (browser may already be gone): {}", e);
        }
        shutdown_wrapper(wrapper).await
    }
}
