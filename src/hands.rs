use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use thiserror::Error;
use tracing::{info, warn};

use crate::dom::{ElementFacts, ElementKind};

/// A browser primitive failed.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("browser operation failed: {0}")]
    Browser(String),
    #[error("browser worker thread failed: {0}")]
    Worker(String),
}

/// Narrow seam over the live page. The loop needs exactly these five
/// operations; tests drive it with a scripted fake instead of a browser.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), PageError>;
    async fn click(&self, selector: &str) -> Result<(), PageError>;
    async fn fill(&self, selector: &str, text: &str) -> Result<(), PageError>;
    async fn press_enter(&self, selector: &str) -> Result<(), PageError>;
    async fn scan(&self, kind: ElementKind) -> Result<Vec<ElementFacts>, PageError>;
}

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS[rand::random_range(0..USER_AGENTS.len())]
}

/// Persistent browser session. Created once, reused for the whole run.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Start Chrome with its own shadow profile. Blocking; run it on the
    /// blocking pool.
    pub fn launch(headless: bool) -> Result<Self> {
        let chrome_path = find_chrome()?;

        // Shadow profile keeps agent logins across runs without ever
        // locking the operator's real profile.
        let agent_profile = std::env::current_dir()?.join("agent_profile");
        if !agent_profile.exists() {
            info!(path = %agent_profile.display(), "creating browser shadow profile");
            std::fs::create_dir_all(&agent_profile)?;
        }

        let options = LaunchOptions {
            headless,
            path: Some(chrome_path),
            user_data_dir: Some(agent_profile),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                // Anti-bot flags
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            // Local model rounds can take minutes between browser touches.
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser =
            Browser::new(options).map_err(|e| anyhow::anyhow!("browser launch failed: {e}"))?;
        let tab = browser.new_tab()?;

        let user_agent = random_user_agent();
        if let Err(e) = tab.set_user_agent(user_agent, None, None) {
            warn!(error = %e, "could not set user agent, keeping the default");
        }
        tab.navigate_to("about:blank")?;

        info!(user_agent, "browser ready");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Run a browser operation on the blocking pool. CDP round-trips block.
    async fn run_blocking<T, F>(&self, job: F) -> Result<T, PageError>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || job(&tab))
            .await
            .map_err(|e| PageError::Worker(e.to_string()))?
            .map_err(|e| PageError::Browser(format!("{e:#}")))
    }
}

#[async_trait]
impl Page for BrowserSession {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        let url = url.to_string();
        self.run_blocking(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let selector = selector.to_string();
        self.run_blocking(move |tab| {
            tab.wait_for_xpath(&selector)?.click()?;
            Ok(())
        })
        .await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), PageError> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.run_blocking(move |tab| {
            let element = tab.wait_for_xpath(&selector)?;
            // Clear any leftover value first; elements without one ignore it.
            let _ = element.call_js_fn(
                "function () { if ('value' in this) { this.value = ''; } }",
                vec![],
                false,
            );
            element.type_into(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_enter(&self, selector: &str) -> Result<(), PageError> {
        let selector = selector.to_string();
        self.run_blocking(move |tab| {
            tab.wait_for_xpath(&selector)?.click()?;
            tab.press_key("Enter")?;
            Ok(())
        })
        .await
    }

    async fn scan(&self, kind: ElementKind) -> Result<Vec<ElementFacts>, PageError> {
        self.run_blocking(move |tab| {
            let result = tab.evaluate(kind.scan_js(), false)?;
            let raw = result
                .value
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| "[]".to_string());
            let facts: Vec<ElementFacts> = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("scan payload was not valid json: {e}"))?;
            Ok(facts)
        })
        .await
    }
}

// Helper to find a Chrome executable across platforms.
fn find_chrome() -> Result<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/google-chrome-stable"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
        PathBuf::from("/snap/bin/chromium"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(r"AppData\Local\Google\Chrome\Application\chrome.exe"));
    }

    for path in candidates {
        if path.exists() {
            return Ok(path);
        }
    }

    anyhow::bail!("no Chrome or Chromium executable found; please install Google Chrome")
}
