use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Minimal capability interface over a rendered page.
///
/// Selectors are CSS. Lookups never wait: a transient render delay is the
/// caller's concern, so an empty result means "nothing matched right now".
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Opaque handle to an element of the current document. Handles to the
    /// same element compare equal.
    type Element: Clone + PartialEq + Send + Sync;

    /// Load `url` in this page.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// All elements matching `selector`, in document order.
    async fn locate(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// Descendants of `scope` matching `selector`, in document order.
    async fn locate_within(
        &self,
        scope: &Self::Element,
        selector: &str,
    ) -> Result<Vec<Self::Element>>;

    /// Visible text of the element.
    async fn text(&self, element: &Self::Element) -> Result<String>;

    /// Raw attribute value, `None` when the attribute is absent.
    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    /// Lowercase tag name.
    async fn tag_name(&self, element: &Self::Element) -> Result<String>;

    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Run `script` as a function body in the page and return its value.
    async fn evaluate(&self, script: &str) -> Result<Value>;
}

/// Source of pages for individual checks.
///
/// The source itself (a browser session) is managed by the host; checks only
/// borrow a page for their own duration and hand it back.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Page: PageDriver;

    async fn open_page(&self) -> Result<Self::Page>;

    /// Release a page obtained from [`PageSource::open_page`].
    async fn release_page(&self, page: Self::Page) -> Result<()>;
}
