use crate::capability::PageDriver;
use anyhow::Result;
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, Locator};
use serde_json::Value;
use tracing::{debug, warn};

/// One browser window driven through WebDriver.
///
/// Call [`WebDriverPage::release`] when done. A page dropped without release
/// (for instance because the owning future was cancelled) closes its window
/// in the background.
pub struct WebDriverPage {
    client: Client,
    window: WindowHandle,
    home: WindowHandle,
    released: bool,
}

impl WebDriverPage {
    pub(crate) fn new(client: Client, window: WindowHandle, home: WindowHandle) -> Self {
        Self {
            client,
            window,
            home,
            released: false,
        }
    }

    /// Close this window and return the session to its original window.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        close_window(&self.client, self.window.clone(), self.home.clone()).await
    }
}

async fn close_window(client: &Client, window: WindowHandle, home: WindowHandle) -> Result<()> {
    client.switch_to_window(window).await?;
    client.close_window().await?;
    client.switch_to_window(home).await?;
    debug!(target: "browser.page", "page released");
    Ok(())
}

/// Element handle of a [`WebDriverPage`], compared by WebDriver element reference.
#[derive(Clone, Debug)]
pub struct PageElement(Element);

impl PartialEq for PageElement {
    fn eq(&self, other: &Self) -> bool {
        self.0.element_id() == other.0.element_id()
    }
}

impl Eq for PageElement {}

fn wrap(found: Vec<Element>) -> Vec<PageElement> {
    found.into_iter().map(PageElement).collect()
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(target: "browser.page", "page dropped outside a runtime; window left open");
            return;
        };
        let client = self.client.clone();
        let window = self.window.clone();
        let home = self.home.clone();
        handle.spawn(async move {
            if let Err(e) = close_window(&client, window, home).await {
                warn!(target: "browser.page", error = %e, "background page release failed");
            }
        });
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    type Element = PageElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(target: "browser.page", %url, "navigate");
        self.client.goto(url).await?;
        Ok(())
    }

    async fn locate(&self, selector: &str) -> Result<Vec<PageElement>> {
        Ok(wrap(self.client.find_all(Locator::Css(selector)).await?))
    }

    async fn locate_within(&self, scope: &PageElement, selector: &str) -> Result<Vec<PageElement>> {
        Ok(wrap(scope.0.find_all(Locator::Css(selector)).await?))
    }

    async fn text(&self, element: &PageElement) -> Result<String> {
        Ok(element.0.text().await?)
    }

    async fn attribute(&self, element: &PageElement, name: &str) -> Result<Option<String>> {
        Ok(element.0.attr(name).await?)
    }

    async fn tag_name(&self, element: &PageElement) -> Result<String> {
        Ok(element.0.tag_name().await?.to_ascii_lowercase())
    }

    async fn click(&self, element: &PageElement) -> Result<()> {
        element.0.click().await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        Ok(self.client.execute(script, vec![]).await?)
    }
}
