use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page as Cdp;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::BrowserConfig;
use crate::dom::{ELEMENTS_JS, parse_script_output};
use crate::page::{Page, ScrollDirection};
use crate::types::{Locator, RawElement};

const CLEAR_JS: &str = r#"function () {
  if ('value' in this) { this.value = ''; }
  else if (this.isContentEditable) { this.textContent = ''; }
  this.dispatchEvent(new Event('input', { bubbles: true }));
}"#;

/// Chrome driven over the DevTools protocol. Every call runs on the blocking
/// pool so the async loop is never stalled by the browser.
pub struct ChromeSession {
    browser: Browser,
    tab: Arc<Tab>,
    timeout: Duration,
}

impl ChromeSession {
    /// Attach to a Chrome already listening on the debugging port, or launch
    /// a new one with its own profile.
    pub async fn start(config: &BrowserConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        if !config.no_attach {
            info!(port = config.debug_port, "attempting to attach to existing Chrome");
            match debugger_url(config.debug_port).await {
                Ok(ws_url) => {
                    let browser = tokio::task::spawn_blocking(move || Browser::connect(ws_url))
                        .await
                        .map_err(|e| anyhow!("browser attach panicked: {}", e))?
                        .context("could not attach to Chrome")?;
                    info!("attached to existing Chrome");
                    return Self::from_browser(browser, timeout).await;
                }
                Err(e) => info!(reason = %format!("{:#}", e), "no Chrome to attach to, launching one"),
            }
        }

        let profile = match &config.profile_dir {
            Some(dir) => dir.clone(),
            None => default_profile_dir()?,
        };
        std::fs::create_dir_all(&profile)
            .with_context(|| format!("cannot create profile dir {}", profile.display()))?;

        let headless = config.headless;
        let chrome_path = config.chrome_path.clone();
        let browser = tokio::task::spawn_blocking(move || launch(headless, chrome_path, profile))
            .await
            .map_err(|e| anyhow!("browser launch panicked: {}", e))??;
        Self::from_browser(browser, timeout).await
    }

    async fn from_browser(browser: Browser, timeout: Duration) -> Result<Self> {
        let (browser, tab) = tokio::task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>)> {
            let tab = browser.new_tab().context("could not open a tab")?;
            tab.set_default_timeout(timeout);
            Ok((browser, tab))
        })
        .await
        .map_err(|e| anyhow!("browser task panicked: {}", e))??;

        info!("Chrome ready");
        Ok(Self {
            browser,
            tab,
            timeout,
        })
    }

    /// Start over in a fresh tab; the previous one is left open.
    pub async fn new_tab(&mut self) -> Result<()> {
        let browser = self.browser.clone();
        let timeout = self.timeout;
        let tab = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            Ok(tab)
        })
        .await
        .map_err(|e| anyhow!("browser task panicked: {}", e))??;
        self.tab = tab;
        Ok(())
    }

    fn on_tab<T, F>(&self, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        async move {
            tokio::task::spawn_blocking(move || op(&tab))
                .await
                .map_err(|e| anyhow!("browser task panicked: {}", e))?
        }
    }
}

#[async_trait]
impl Page for ChromeSession {
    async fn current_url(&mut self) -> Result<String> {
        self.on_tab(|tab| {
            let result = tab.evaluate("window.location.href", false)?;
            result
                .value
                .and_then(|v| v.as_str().map(String::from))
                .context("page has no location")
        })
        .await
    }

    async fn raw_elements(&mut self) -> Result<Vec<RawElement>> {
        self.on_tab(|tab| {
            let result = tab.evaluate(ELEMENTS_JS, false)?;
            parse_script_output(result.value)
        })
        .await
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.on_tab(move |tab| {
            tab.navigate_to(&url)
                .with_context(|| format!("failed to open {}", url))?;
            Ok(())
        })
        .await
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        let xpath = locator.as_str().to_string();
        self.on_tab(move |tab| {
            tab.wait_for_xpath(&xpath)
                .with_context(|| format!("element {} not found", xpath))?
                .click()?;
            Ok(())
        })
        .await
    }

    async fn clear(&mut self, locator: &Locator) -> Result<()> {
        let xpath = locator.as_str().to_string();
        self.on_tab(move |tab| {
            tab.wait_for_xpath(&xpath)
                .with_context(|| format!("element {} not found", xpath))?
                .call_js_fn(CLEAR_JS, vec![], false)?;
            Ok(())
        })
        .await
    }

    async fn type_text(&mut self, locator: &Locator, text: &str) -> Result<()> {
        let xpath = locator.as_str().to_string();
        let text = text.to_string();
        self.on_tab(move |tab| {
            tab.wait_for_xpath(&xpath)
                .with_context(|| format!("element {} not found", xpath))?
                .type_into(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_enter(&mut self) -> Result<()> {
        self.on_tab(|tab| {
            tab.press_key("Enter")?;
            Ok(())
        })
        .await
    }

    async fn scroll(&mut self, direction: ScrollDirection) -> Result<()> {
        let script = match direction {
            ScrollDirection::Up => "window.scrollBy(0, -window.innerHeight + 200)",
            ScrollDirection::Down => "window.scrollBy(0, window.innerHeight - 200)",
        };
        self.on_tab(move |tab| {
            tab.evaluate(script, false)?;
            Ok(())
        })
        .await
    }

    /// Goes through the tab's CDP navigation history and returns only once
    /// the tab has left the current document.
    async fn go_back(&mut self) -> Result<()> {
        let timeout = self.timeout;
        self.on_tab(move |tab| {
            let history = tab.call_method(Cdp::GetNavigationHistory(None))?;
            let entry = back_target(&history.entries, history.current_index as usize)?;
            let (entry_id, target) = (entry.id, entry.url.clone());
            let leaving = tab.get_url();

            tab.call_method(Cdp::NavigateToHistoryEntry { entry_id })?;

            let deadline = Instant::now() + timeout;
            loop {
                let url = tab.get_url();
                if url == target || url != leaving {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    bail!("still on {} after {:?} going back to {}", leaving, timeout, target);
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        })
        .await
    }

    async fn wait_for_load(&mut self) -> Result<()> {
        let timeout = self.timeout;
        self.on_tab(move |tab| {
            tab.wait_until_navigated()?;
            let deadline = Instant::now() + timeout;
            loop {
                let state = tab
                    .evaluate("document.readyState", false)
                    .ok()
                    .and_then(|r| r.value)
                    .and_then(|v| v.as_str().map(String::from));
                if matches!(state.as_deref(), Some("interactive" | "complete")) {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    bail!("page still loading after {:?}", timeout);
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        })
        .await
    }
}

/// WebSocket debugger URL of a Chrome listening on `port`.
async fn debugger_url(port: u16) -> Result<String> {
    let version: serde_json::Value = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/json/version", port))
        .timeout(Duration::from_secs(2))
        .send()
        .await?
        .json()
        .await?;
    version["webSocketDebuggerUrl"]
        .as_str()
        .map(String::from)
        .context("no webSocketDebuggerUrl in /json/version")
}

fn launch(headless: bool, path: Option<PathBuf>, profile: PathBuf) -> Result<Browser> {
    let options = LaunchOptions {
        headless,
        path,
        user_data_dir: Some(profile),
        args: vec![
            std::ffi::OsStr::new("--no-first-run"),
            std::ffi::OsStr::new("--no-default-browser-check"),
            std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
            std::ffi::OsStr::new("--disable-infobars"),
            std::ffi::OsStr::new("--start-maximized"),
        ],
        idle_browser_timeout: Duration::from_secs(600),
        ..Default::default()
    };

    info!(headless, "launching Chrome");
    Browser::new(options).map_err(|e| {
        warn!(error = %e, "browser launch failed");
        anyhow!("browser launch failed: {}", e)
    })
}

/// The history entry just before `current_index`.
fn back_target<T>(entries: &[T], current_index: usize) -> Result<&T> {
    current_index
        .checked_sub(1)
        .and_then(|i| entries.get(i))
        .context("no previous page in this tab's history")
}

fn default_profile_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory for the Chrome profile")?;
    Ok(base.join("browser-pilot").join("profile"))
}
