//! UI affordance checks: outbound links and the theme toggle.
//!
//! Section-scoped link audits reuse the rendered section walk; no text
//! handling is shared with the consistency check.
use crate::rendered::{RenderedSectionExtractor, RenderedTarget};
use concord_common::{CheckError, LinkCheckPolicy, LinkScope, Result, SectionScope, ThemeMarker};
use concord_drivers::PageDriver;
use serde::Serialize;
use tracing::{debug, info};

const ANCHOR_SELECTOR: &str = "a";
const PLACEHOLDER_HREF: &str = "#";

/// An anchor without a usable destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkViolation {
    /// Zero-based position among all anchors inspected.
    pub position: usize,
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkAudit {
    pub checked: usize,
    pub violations: Vec<LinkViolation>,
}

impl LinkAudit {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

fn is_placeholder(href: Option<&str>) -> bool {
    match href.map(str::trim) {
        None => true,
        Some(h) => h.is_empty() || h == PLACEHOLDER_HREF,
    }
}

/// Inspect every anchor under the elements matching `container`.
///
/// With [`LinkCheckPolicy::FailFast`] the audit stops at the first broken
/// link; [`LinkCheckPolicy::CollectAll`] reports all of them. A container
/// without anchors is valid. Nested matches do not count an anchor twice.
pub async fn audit_links<D: PageDriver>(
    driver: &D,
    page_url: &str,
    container: &str,
    policy: LinkCheckPolicy,
) -> Result<LinkAudit> {
    driver.navigate(page_url).await?;

    let containers = driver.locate(container).await?;
    if containers.is_empty() {
        return Err(CheckError::ElementNotFound {
            url: page_url.to_string(),
            query: container.to_string(),
        });
    }

    let anchors = anchors_within(driver, &containers).await?;
    audit_anchors(driver, page_url, container, &anchors, policy).await
}

/// Like [`audit_links`], over the blocks of the rendered section `title`.
///
/// Subsections belong to the section; heading blocks (and their edit links)
/// are not inspected.
pub async fn audit_section_links<D: PageDriver>(
    driver: &D,
    target: &RenderedTarget,
    title: &str,
    policy: LinkCheckPolicy,
) -> Result<LinkAudit> {
    let blocks = RenderedSectionExtractor::new(driver, target)
        .section_blocks(title, SectionScope::Subtree)
        .await?;
    let anchors = anchors_within(driver, &blocks).await?;
    let label = LinkScope::Section(title.to_string()).to_string();
    audit_anchors(driver, &target.page_url, &label, &anchors, policy).await
}

/// Dispatch on where the links live.
pub async fn audit_link_scope<D: PageDriver>(
    driver: &D,
    target: &RenderedTarget,
    scope: &LinkScope,
    policy: LinkCheckPolicy,
) -> Result<LinkAudit> {
    match scope {
        LinkScope::Container(selector) => {
            audit_links(driver, &target.page_url, selector, policy).await
        }
        LinkScope::Section(title) => audit_section_links(driver, target, title, policy).await,
    }
}

/// `true` when every anchor under `container` has a real destination.
pub async fn links_valid<D: PageDriver>(driver: &D, page_url: &str, container: &str) -> Result<bool> {
    audit_links(driver, page_url, container, LinkCheckPolicy::FailFast)
        .await
        .map(|audit| audit.is_valid())
}

/// Anchors under any of `scopes`, in first-seen order, each once.
async fn anchors_within<D: PageDriver>(driver: &D, scopes: &[D::Element]) -> Result<Vec<D::Element>> {
    let mut anchors: Vec<D::Element> = Vec::new();
    for scope in scopes {
        for anchor in driver.locate_within(scope, ANCHOR_SELECTOR).await? {
            if !anchors.contains(&anchor) {
                anchors.push(anchor);
            }
        }
    }
    Ok(anchors)
}

async fn audit_anchors<D: PageDriver>(
    driver: &D,
    page_url: &str,
    scope: &str,
    anchors: &[D::Element],
    policy: LinkCheckPolicy,
) -> Result<LinkAudit> {
    let mut audit = LinkAudit {
        checked: 0,
        violations: Vec::new(),
    };
    for (position, anchor) in anchors.iter().enumerate() {
        audit.checked += 1;
        let href = driver.attribute(anchor, "href").await?;
        if is_placeholder(href.as_deref()) {
            debug!(target: "concord.links", position, ?href, "unusable link");
            audit.violations.push(LinkViolation { position, href });
            if policy == LinkCheckPolicy::FailFast {
                break;
            }
        }
    }

    info!(
        target: "concord.links",
        url = %page_url,
        %scope,
        checked = audit.checked,
        violations = audit.violations.len(),
        ?policy,
        "links audited"
    );
    Ok(audit)
}

/// Controls that switch the theme, clicked in order, and the marker they flip.
#[derive(Debug, Clone)]
pub struct ThemeToggle {
    pub triggers: Vec<String>,
    pub marker: ThemeMarker,
}

/// Marker state around one toggle invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeTransition {
    pub before: bool,
    pub after: bool,
}

impl ThemeTransition {
    pub fn toggled(&self) -> bool {
        self.before != self.after
    }
}

/// Current state of the theme marker on the loaded page.
pub async fn theme_active<D: PageDriver>(
    driver: &D,
    page_url: &str,
    marker: &ThemeMarker,
) -> Result<bool> {
    match marker {
        ThemeMarker::Class { selector, class } => {
            let el = first_match(driver, page_url, selector).await?;
            let classes = driver.attribute(&el, "class").await?.unwrap_or_default();
            Ok(classes.split_whitespace().any(|c| c == class))
        }
        ThemeMarker::Attribute {
            selector,
            name,
            value,
        } => {
            let el = first_match(driver, page_url, selector).await?;
            let actual = driver.attribute(&el, name).await?;
            Ok(match (actual, value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == *expected,
            })
        }
        ThemeMarker::Script { script } => match driver.evaluate(script).await? {
            serde_json::Value::Bool(active) => Ok(active),
            other => Err(CheckError::Driver(anyhow::anyhow!(
                "theme marker script returned {other}, expected a boolean"
            ))),
        },
    }
}

/// Click the toggle controls on the loaded page and read the marker on
/// both sides. No waiting or retry happens in between.
pub async fn toggle_theme<D: PageDriver>(
    driver: &D,
    page_url: &str,
    toggle: &ThemeToggle,
) -> Result<ThemeTransition> {
    let before = theme_active(driver, page_url, &toggle.marker).await?;
    for trigger in &toggle.triggers {
        let el = first_match(driver, page_url, trigger).await?;
        driver.click(&el).await?;
    }
    let after = theme_active(driver, page_url, &toggle.marker).await?;

    let transition = ThemeTransition { before, after };
    info!(
        target: "concord.theme",
        url = %page_url,
        before,
        after,
        toggled = transition.toggled(),
        "theme toggled"
    );
    Ok(transition)
}

/// Load the page, then [`toggle_theme`] once.
pub async fn check_theme_toggle<D: PageDriver>(
    driver: &D,
    page_url: &str,
    toggle: &ThemeToggle,
) -> Result<ThemeTransition> {
    driver.navigate(page_url).await?;
    toggle_theme(driver, page_url, toggle).await
}

async fn first_match<D: PageDriver>(driver: &D, page_url: &str, selector: &str) -> Result<D::Element> {
    driver
        .locate(selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CheckError::ElementNotFound {
            url: page_url.to_string(),
            query: selector.to_string(),
        })
}
