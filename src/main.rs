// Command-line entry point: harvest image search results for one query.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use image_harvest::{
    BrowserFamily, ChromiumLauncher, ErrorRateBasis, QuerySpec, RunCoordinator, ScrapeConfig,
    load_metadata,
};

#[derive(Parser, Debug)]
#[command(
    name = "image-harvest",
    version,
    about = "Scrape image search results with a headless browser and download them"
)]
struct Cli {
    /// Search terms to query.
    #[arg(long, alias = "query-terms", env = "IMAGE_HARVEST_QUERY")]
    query: String,

    /// Endpoint to query; only google-images is implemented.
    #[arg(long, env = "IMAGE_HARVEST_ENDPOINT", default_value = "google-images")]
    endpoint: String,

    /// Number of distinct results to aim for.
    #[arg(long, env = "IMAGE_HARVEST_MAX_ITEMS", default_value_t = 100)]
    max_items: usize,

    /// Language code restricting results (sent as lr=lang_<code>).
    #[arg(long, env = "IMAGE_HARVEST_LANGUAGE", default_value = "en")]
    language: String,

    /// Browser family: Chrome, Chromium or Firefox (Firefox needs --remote-endpoint).
    #[arg(long, env = "IMAGE_HARVEST_BROWSER", default_value = "Chrome", value_parser = parse_browser)]
    browser: BrowserFamily,

    /// Where to store images and the manifest; defaults to a fresh temp directory.
    #[arg(long, env = "IMAGE_HARVEST_OUTPUT_PATH")]
    output_path: Option<PathBuf>,

    /// JSON object merged into every manifest document.
    #[arg(long, env = "IMAGE_HARVEST_METADATA_PATH")]
    metadata_path: Option<PathBuf>,

    /// Match the query verbatim.
    #[arg(long, default_value_t = false)]
    exact_match: bool,

    /// Also download the related images shown next to each result.
    #[arg(long, default_value_t = false)]
    track_related: bool,

    /// Extra search URL parameter as key=value; repeatable.
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Show the browser window.
    #[arg(long, default_value_t = false)]
    headed: bool,

    /// Proxy server for the browser, e.g. socks5://127.0.0.1:9050.
    #[arg(long, env = "IMAGE_HARVEST_PROXY")]
    proxy: Option<String>,

    /// DevTools websocket of an already running browser to attach to.
    #[arg(long, env = "IMAGE_HARVEST_REMOTE_ENDPOINT")]
    remote_endpoint: Option<String>,

    /// Resize stored images to WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_dimensions)]
    compress: Option<(u32, u32)>,

    /// Highest tolerated error rate before the run fails.
    #[arg(long, default_value_t = 0.2)]
    acceptable_error_rate: f64,

    /// Count every failed item in the error rate, not just distinct error kinds.
    #[arg(long, default_value_t = false)]
    count_every_error: bool,

    /// Stop harvesting after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Seed for pacing and tie-breaking randomness.
    #[arg(long)]
    seed: Option<u64>,

    /// Skip writing manifest.json.
    #[arg(long, default_value_t = false)]
    no_manifest: bool,
}

fn parse_browser(raw: &str) -> Result<BrowserFamily, String> {
    raw.parse().map_err(|e: image_harvest::ScrapeError| e.to_string())
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn parse_dimensions(raw: &str) -> Result<(u32, u32), String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let parse = |s: &str| s.trim().parse::<u32>().map_err(|e| format!("'{s}': {e}"));
    Ok((parse(width)?, parse(height)?))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("IMAGE_HARVEST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let output_path = cli.output_path.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("image_harvest_{}", std::process::id()))
    });

    let basis = if cli.count_every_error {
        ErrorRateBasis::Occurrences
    } else {
        ErrorRateBasis::DistinctKinds
    };

    let builder = ScrapeConfig::builder()
        .output_dir(output_path.clone())
        .browser_family(cli.browser)
        .headless(!cli.headed)
        .proxy(cli.proxy)
        .remote_endpoint(cli.remote_endpoint)
        .compress_dimensions(cli.compress)
        .acceptable_error_rate(cli.acceptable_error_rate)
        .error_rate_basis(basis)
        .run_timeout(cli.timeout_secs.map(Duration::from_secs))
        .rng_seed(cli.seed)
        .write_manifest(!cli.no_manifest);
    let config = builder.build().context("Invalid configuration")?;

    let query = QuerySpec::new(cli.query, cli.max_items)
        .language(cli.language)
        .exact_match(cli.exact_match)
        .track_related(cli.track_related)
        .extra_params(cli.params.into_iter().collect());

    let metadata = load_metadata(cli.metadata_path.as_deref()).await?;

    let coordinator = RunCoordinator::new(config, ChromiumLauncher);
    let outcome = coordinator.run(&cli.endpoint, &query, metadata).await?;

    info!(
        "Gathered {} images into {}",
        outcome.documents.len(),
        output_path.display()
    );
    Ok(())
}
