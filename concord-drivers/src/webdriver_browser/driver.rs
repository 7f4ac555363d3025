use crate::capability::PageSource;
use crate::webdriver_browser::page::WebDriverPage;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use tracing::debug;
use url::Url;
use webdriver::capabilities::Capabilities;

const WINDOW_SIZE_ARG: &str = "--window-size=1280,900";

/// Thin wrapper around a `fantoccini` WebDriver session.
///
/// The session is launched and closed by the host. Pages opened from it are
/// separate windows of the same session and must be used one at a time,
/// because WebDriver commands act on the session's current window.
pub struct WebDriverBrowser {
    client: Client,
    home: WindowHandle,
}

impl WebDriverBrowser {
    /// Connect to a running WebDriver service (e.g. `http://localhost:9515`
    /// for Chromedriver).
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        Url::parse(webdriver_url)
            .with_context(|| format!("invalid WebDriver URL: {webdriver_url}"))?;

        let caps = build_capabilities(headless);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .with_context(|| format!("failed to open WebDriver session at {webdriver_url}"))?;
        let home = client.window().await?;

        debug!(target: "browser.session", %webdriver_url, headless, "webdriver session opened");
        Ok(Self { client, home })
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        debug!(target: "browser.session", "webdriver session closed");
        Ok(())
    }
}

#[cfg(feature = "chromium")]
fn build_capabilities(headless: bool) -> Capabilities {
    let mut args = vec![json!(WINDOW_SIZE_ARG)];
    if headless {
        args.push(json!("--headless=new"));
        args.push(json!("--disable-gpu"));
    }
    let mut caps = Capabilities::new();
    caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
    caps
}

#[cfg(not(feature = "chromium"))]
fn build_capabilities(headless: bool) -> Capabilities {
    let mut args = Vec::new();
    if headless {
        args.push(json!("-headless"));
    }
    let mut caps = Capabilities::new();
    caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
    caps
}

#[async_trait]
impl PageSource for WebDriverBrowser {
    type Page = WebDriverPage;

    async fn open_page(&self) -> Result<WebDriverPage> {
        let created = self.client.new_window(true).await?;
        self.client
            .switch_to_window(created.handle.clone())
            .await
            .map_err(|e| anyhow!("failed to switch to new window: {e}"))?;
        debug!(target: "browser.page", "page opened");
        Ok(WebDriverPage::new(
            self.client.clone(),
            created.handle,
            self.home.clone(),
        ))
    }

    async fn release_page(&self, page: WebDriverPage) -> Result<()> {
        page.release().await
    }
}
