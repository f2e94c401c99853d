use anyhow::{Context, Result, anyhow};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::config::{BrowserConfig, BrowserFamily};
use crate::utils::constants::CHROME_USER_AGENT;

/// Installation paths for the given family on the current platform, most specific first.
fn candidate_paths(family: BrowserFamily) -> Vec<&'static str> {
    let (chrome, chromium): (Vec<&str>, Vec<&str>) = if cfg!(target_os = "windows") {
        (
            vec![
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            ],
            vec![
                r"C:\Program Files\Chromium\Application\chrome.exe",
                r"C:\Program Files (x86)\Chromium\Application\chrome.exe",
            ],
        )
    } else if cfg!(target_os = "macos") {
        (
            vec![
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ],
            vec![
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "~/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/opt/homebrew/bin/chromium",
            ],
        )
    } else {
        (
            vec![
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/opt/google/chrome/chrome",
            ],
            vec![
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
                "/usr/local/bin/chromium",
            ],
        )
    };

    match family {
        BrowserFamily::Chromium => chromium.into_iter().chain(chrome).collect(),
        _ => chrome.into_iter().chain(chromium).collect(),
    }
}

/// Find a Chrome/Chromium executable on the system.
///
/// `CHROMIUM_PATH` overrides every other lookup.
pub async fn find_browser_executable(family: BrowserFamily) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(
                "Using browser from CHROMIUM_PATH environment variable: {}",
                path.display()
            );
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH environment variable points to non-existent file: {}",
            path.display()
        );
    }

    for path_str in candidate_paths(family) {
        let path = if let Some(rest) = path_str.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            }
        } else if path_str.contains('%') && cfg!(target_os = "windows") {
            PathBuf::from(expand_windows_env_vars(path_str))
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["google-chrome", "chromium", "chromium-browser", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser using 'which' command: {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    warn!("No Chrome/Chromium executable found. Will download and use fetcher.");
    Err(anyhow!("Chrome/Chromium executable not found"))
}

/// Expand `%VAR%` tokens; unknown variables are left untouched.
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(start) = rest.find('%') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) if !name.is_empty() => result.push_str(&value),
                    _ if name.is_empty() => result.push('%'),
                    _ => {
                        result.push('%');
                        result.push_str(name);
                        result.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push('%');
                result.push_str(after);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Downloads a managed Chromium build when none is installed.
/// Returns the path to the downloaded executable.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir().join("image_harvest_cache");
            warn!(
                "Could not determine cache directory, using temp directory fallback: {}",
                fallback.display()
            );
            fallback
        })
        .join("image_harvest")
        .join("chromium");

    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );

    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;

    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Drive the browser's CDP event stream on a tracked task.
///
/// The returned handle MUST be aborted once the browser is closed.
fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();

                // Chrome emits CDP events chromiumoxide cannot deserialize
                // https://github.com/mattsse/chromiumoxide/issues/167
                let is_benign_serialization_error = error_msg
                    .contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");

                if is_benign_serialization_error {
                    trace!("Suppressed benign CDP serialization error: {}", error_msg);
                } else {
                    error!("Browser handler error: {:?}", e);
                }
            }
        }
        info!("Browser handler task completed");
    })
}

/// Launch a local browser configured for stealth.
///
/// Returns the browser, its tracked handler task and the profile directory that
/// must be removed once the browser process has exited.
pub async fn launch_browser(config: &BrowserConfig) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    if config.family == BrowserFamily::Firefox {
        return Err(anyhow!(
            "Firefox cannot be launched over the DevTools protocol; \
             start it yourself and pass its endpoint as remote_endpoint"
        ));
    }

    let chrome_path = match &config.executable {
        Some(path) => path.clone(),
        None => match find_browser_executable(config.family).await {
            Ok(path) => path,
            Err(_) => download_managed_browser().await?,
        },
    };

    let user_data_dir = config.user_data_dir.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("image_harvest_chrome_{}", std::process::id()))
    });

    std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

    let (width, height) = config.window_size;
    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(config.request_timeout)
        .window_size(width, height)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(chrome_path);

    if config.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    if let Some(proxy) = &config.proxy {
        config_builder = config_builder.arg(format!("--proxy-server={proxy}"));
    }

    config_builder = config_builder
        .arg(format!("--user-agent={}", CHROME_USER_AGENT))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-setuid-sandbox")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-features=TranslateUI")
        .arg("--disable-hang-monitor")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--mute-audio");

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {e}"))?;

    info!("Launching {} (headless: {})", config.family, config.headless);
    let (browser, handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    Ok((browser, spawn_handler(handler), user_data_dir))
}

/// Attach to an already running browser through its DevTools endpoint.
pub async fn connect_browser(endpoint: &str) -> Result<(Browser, JoinHandle<()>)> {
    info!("Connecting to remote browser at {}", endpoint);
    let (browser, handler) = Browser::connect(endpoint)
        .await
        .with_context(|| format!("Failed to connect to browser at {endpoint}"))?;

    Ok((browser, spawn_handler(handler)))
}

/// Patch the navigator properties automation detectors look at.
pub async fn apply_stealth_measures(page: &chromiumoxide::Page, language: &str) -> Result<()> {
    info!("Applying stealth measures to page");

    page.evaluate(
        r"
        Object.defineProperty(navigator, 'webdriver', {
            get: () => false
        });
    ",
    )
    .await?;

    let languages_js = format!(
        r"
        Object.defineProperty(navigator, 'languages', {{
            get: () => ['{language}', 'en']
        }});
    "
    );
    page.evaluate(languages_js.as_str()).await?;

    page.evaluate(
        r"
        if (!window.chrome) {
            window.chrome = {};
        }
        if (!window.chrome.runtime) {
            window.chrome.runtime = {
                connect: () => ({
                    onMessage: { addListener: () => {}, removeListener: () => {} },
                    postMessage: () => {}
                })
            };
        }
    ",
    )
    .await?;

    Ok(())
}
