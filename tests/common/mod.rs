//! Test utilities for the image_harvest test suite
//!
//! `SimulatedPage` stands in for a browser page showing an image results
//! grid: thumbnails appear in batches as the page is scrolled, clicking a
//! thumbnail "opens" its enlarged image, and obstacle controls can be placed
//! on the page. `SimulatedLauncher` hands such pages to the run coordinator.

use image::{ImageFormat, Rgb, RgbImage};
use image_harvest::config::BrowserConfig;
use image_harvest::driver::{DriverError, DriverSession, PageDriver, Selector, SessionLauncher};
use image_harvest::harvest::types::{
    COOKIE_ACCEPT_SELECTOR, ENLARGED_IMAGE_ALT_SELECTOR, ENLARGED_IMAGE_SELECTOR,
    LOAD_MORE_SELECTOR, RELATED_IMAGE_SELECTOR, SCROLL_TO_END_SCRIPT, SEE_MORE_ANYWAY_SELECTOR,
    THUMBNAIL_SELECTOR,
};
use image_harvest::ScrapeResult;
use mockito::{Matcher, Mock, ServerGuard};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An image element on the simulated page
#[derive(Debug, Clone)]
pub struct SimImage {
    pub src: Option<String>,
    pub alt: Option<String>,
    /// Every attribute read fails as a detached node
    pub stale: bool,
}

#[allow(dead_code)]
impl SimImage {
    pub fn new(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            alt: Some(alt.into()),
            stale: false,
        }
    }

    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// One result of the grid: its thumbnail and what clicking it reveals
#[derive(Debug, Clone, Default)]
pub struct SimResult {
    pub enlarged: Vec<SimImage>,
    pub enlarged_alt: Vec<SimImage>,
    pub related: Vec<SimImage>,
    pub click_fails: bool,
}

#[allow(dead_code)]
impl SimResult {
    /// A result whose enlarged image resolves to `src`
    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            enlarged: vec![SimImage::new(src, alt)],
            ..Self::default()
        }
    }

    /// A result showing nothing under either enlarged-image selector
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn unclickable(mut self) -> Self {
        self.click_fails = true;
        self
    }

    pub fn with_related(mut self, related: Vec<SimImage>) -> Self {
        self.related = related;
        self
    }
}

/// Obstacle controls present on the simulated page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimObstacle {
    SeeMore,
    Cookie,
    LoadMore,
}

/// Static description of a simulated page
#[derive(Debug, Clone)]
pub struct SimSpec {
    pub results: Vec<SimResult>,
    /// Thumbnails revealed per scroll
    pub batch: usize,
    /// Growth halts at this many thumbnails until "load more" is clicked
    pub load_more_gate: Option<usize>,
    pub see_more: bool,
    pub cookie_banner: bool,
    /// Thumbnail listings (by call number, from zero) that fail as stale
    pub failed_listings: Vec<usize>,
}

#[allow(dead_code)]
impl SimSpec {
    pub fn new(results: Vec<SimResult>) -> Self {
        Self {
            results,
            batch: 20,
            load_more_gate: None,
            see_more: false,
            cookie_banner: false,
            failed_listings: Vec::new(),
        }
    }

    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    pub fn load_more_gate(mut self, at: usize) -> Self {
        self.load_more_gate = Some(at);
        self
    }

    pub fn see_more(mut self) -> Self {
        self.see_more = true;
        self
    }

    pub fn cookie_banner(mut self) -> Self {
        self.cookie_banner = true;
        self
    }

    pub fn fail_listing(mut self, call: usize) -> Self {
        self.failed_listings.push(call);
        self
    }
}

/// Element reference handed out by the simulated page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimHandle {
    Thumbnail(usize),
    Enlarged { result: usize, index: usize, alternate: bool },
    Related { result: usize, index: usize },
    Obstacle(SimObstacle),
}

#[derive(Debug)]
struct SimState {
    visible: usize,
    gate: Option<usize>,
    see_more: bool,
    cookie_banner: bool,
    selected: Option<usize>,
    url: Option<String>,
    scrolls: usize,
    listings: usize,
    clicks: Vec<SimObstacle>,
}

/// Counters shared between a launcher and the sessions it opened
#[derive(Debug, Default)]
pub struct SessionProbe {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

#[allow(dead_code)]
impl SessionProbe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory results page implementing the driver capabilities
pub struct SimulatedPage {
    spec: SimSpec,
    state: Mutex<SimState>,
    probe: Arc<SessionProbe>,
    closed: bool,
}

#[allow(dead_code)]
impl SimulatedPage {
    pub fn new(spec: SimSpec) -> Self {
        Self::with_probe(spec, Arc::new(SessionProbe::default()))
    }

    pub fn with_probe(spec: SimSpec, probe: Arc<SessionProbe>) -> Self {
        let state = SimState {
            visible: 0,
            gate: spec.load_more_gate,
            see_more: spec.see_more,
            cookie_banner: spec.cookie_banner,
            selected: None,
            url: None,
            scrolls: 0,
            listings: 0,
            clicks: Vec::new(),
        };
        Self {
            spec,
            state: Mutex::new(state),
            probe,
            closed: false,
        }
    }

    pub fn scrolls(&self) -> usize {
        self.state.lock().unwrap().scrolls
    }

    pub fn obstacle_clicks(&self) -> Vec<SimObstacle> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigated_to(&self) -> Option<String> {
        self.state.lock().unwrap().url.clone()
    }

    fn image(&self, handle: SimHandle) -> Option<&SimImage> {
        match handle {
            SimHandle::Enlarged { result, index, alternate: false } => {
                self.spec.results.get(result)?.enlarged.get(index)
            }
            SimHandle::Enlarged { result, index, alternate: true } => {
                self.spec.results.get(result)?.enlarged_alt.get(index)
            }
            SimHandle::Related { result, index } => self.spec.results.get(result)?.related.get(index),
            SimHandle::Thumbnail(_) | SimHandle::Obstacle(_) => None,
        }
    }

    fn obstacle_present(&self, obstacle: SimObstacle) -> bool {
        let state = self.state.lock().unwrap();
        match obstacle {
            SimObstacle::SeeMore => state.see_more,
            SimObstacle::Cookie => state.cookie_banner,
            SimObstacle::LoadMore => state.gate.is_some(),
        }
    }
}

impl PageDriver for SimulatedPage {
    type Handle = SimHandle;

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.state.lock().unwrap().url = Some(url.to_string());
        Ok(())
    }

    async fn run_script(&self, js: &str) -> Result<(), DriverError> {
        if js == SCROLL_TO_END_SCRIPT {
            let mut state = self.state.lock().unwrap();
            state.scrolls += 1;
            let ceiling = state
                .gate
                .unwrap_or(usize::MAX)
                .min(self.spec.results.len());
            state.visible = (state.visible + self.spec.batch).min(ceiling).max(state.visible);
        }
        Ok(())
    }

    async fn find_all(&self, selector: Selector) -> Result<Vec<SimHandle>, DriverError> {
        let selected = self.state.lock().unwrap().selected;

        if selector == THUMBNAIL_SELECTOR {
            let mut state = self.state.lock().unwrap();
            let call = state.listings;
            state.listings += 1;
            if self.spec.failed_listings.contains(&call) {
                return Err(DriverError::classify("Could not find node with given id"));
            }
            return Ok((0..state.visible).map(SimHandle::Thumbnail).collect());
        }

        if selector == ENLARGED_IMAGE_SELECTOR || selector == ENLARGED_IMAGE_ALT_SELECTOR {
            let alternate = selector == ENLARGED_IMAGE_ALT_SELECTOR;
            let Some(result) = selected else {
                return Ok(Vec::new());
            };
            let images = if alternate {
                &self.spec.results[result].enlarged_alt
            } else {
                &self.spec.results[result].enlarged
            };
            return Ok((0..images.len())
                .map(|index| SimHandle::Enlarged { result, index, alternate })
                .collect());
        }

        if selector == RELATED_IMAGE_SELECTOR {
            let Some(result) = selected else {
                return Ok(Vec::new());
            };
            return Ok((0..self.spec.results[result].related.len())
                .map(|index| SimHandle::Related { result, index })
                .collect());
        }

        let obstacle = if selector == SEE_MORE_ANYWAY_SELECTOR {
            SimObstacle::SeeMore
        } else if selector == COOKIE_ACCEPT_SELECTOR {
            SimObstacle::Cookie
        } else if selector == LOAD_MORE_SELECTOR {
            SimObstacle::LoadMore
        } else {
            return Ok(Vec::new());
        };

        if self.obstacle_present(obstacle) {
            Ok(vec![SimHandle::Obstacle(obstacle)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn click(&self, handle: &SimHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        match *handle {
            SimHandle::Thumbnail(index) => {
                if self.spec.results[index].click_fails {
                    return Err(DriverError::NotInteractable(
                        "Node is either not visible or not an HTMLElement".into(),
                    ));
                }
                state.selected = Some(index);
            }
            SimHandle::Obstacle(obstacle) => {
                state.clicks.push(obstacle);
                match obstacle {
                    SimObstacle::SeeMore => state.see_more = false,
                    SimObstacle::Cookie => state.cookie_banner = false,
                    SimObstacle::LoadMore => state.gate = None,
                }
            }
            SimHandle::Enlarged { .. } | SimHandle::Related { .. } => {}
        }
        Ok(())
    }

    async fn attribute(&self, handle: &SimHandle, name: &str) -> Result<Option<String>, DriverError> {
        let Some(image) = self.image(*handle) else {
            return Ok(None);
        };
        if image.stale {
            return Err(DriverError::StaleElement("Node is detached from document".into()));
        }
        Ok(match name {
            "src" => image.src.clone(),
            "alt" => image.alt.clone(),
            _ => None,
        })
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        Ok("<html><body><div id=\"islrg\">simulated</div></body></html>".to_string())
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        Ok(self.state.lock().unwrap().url.clone())
    }
}

impl DriverSession for SimulatedPage {
    async fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            self.probe.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Opens a fresh simulated page per run
pub struct SimulatedLauncher {
    pub spec: SimSpec,
    pub probe: Arc<SessionProbe>,
}

#[allow(dead_code)]
impl SimulatedLauncher {
    pub fn new(spec: SimSpec) -> Self {
        Self {
            spec,
            probe: Arc::new(SessionProbe::default()),
        }
    }
}

impl SessionLauncher for SimulatedLauncher {
    type Session = SimulatedPage;

    async fn open(&self, _config: &BrowserConfig, _language: &str) -> ScrapeResult<SimulatedPage> {
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedPage::with_probe(self.spec.clone(), self.probe.clone()))
    }
}

/// A small PNG of a single color
#[allow(dead_code)]
pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_fn(24, 16, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb(color)
        } else {
            Rgb([color[2], color[0], color[1]])
        }
    })
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
    bytes
}

/// Serve PNGs under `/img/<n>.png`, 404s under `/missing/<n>.png`, and
/// descriptive headers for `HEAD` requests
#[allow(dead_code)]
pub async fn serve_images(server: &mut ServerGuard) -> Vec<Mock> {
    let images = server
        .mock("GET", Matcher::Regex(r"^/img/\d+\.png$".to_string()))
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png_bytes([200, 40, 60]))
        .create_async()
        .await;

    let related = server
        .mock("GET", Matcher::Regex(r"^/related/\d+\.png$".to_string()))
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png_bytes([20, 140, 220]))
        .create_async()
        .await;

    let missing = server
        .mock("GET", Matcher::Regex(r"^/missing/\d+\.png$".to_string()))
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;

    let html = server
        .mock("GET", Matcher::Regex(r"^/page/\d+$".to_string()))
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body("<html></html>")
        .create_async()
        .await;

    let head = server
        .mock("HEAD", Matcher::Any)
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
        .with_header("server", "mockito")
        .create_async()
        .await;

    vec![images, related, missing, html, head]
}

/// `count` results pointing at served images
#[allow(dead_code)]
pub fn served_results(server: &ServerGuard, count: usize, alt: &str) -> Vec<SimResult> {
    (0..count)
        .map(|i| SimResult::image(format!("{}/img/{i}.png", server.url()), format!("{alt} {i}")))
        .collect()
}

/// Number of `.jpg` files directly inside `dir`
#[allow(dead_code)]
pub fn count_jpegs(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "jpg"))
                .count()
        })
        .unwrap_or(0)
}
