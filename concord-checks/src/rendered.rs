//! Rendered-page side of the comparison.
//!
//! Sections are not elements in the rendered DOM: a section is a heading
//! followed by sibling blocks up to the next heading of equal-or-higher
//! level. The extractor walks the direct children of the content root in
//! document order and reassembles that run.
use concord_common::{CheckError, Result, SectionScope};
use concord_drivers::PageDriver;
use tracing::debug;

const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";
const HEADLINE_SELECTOR: &str = ".mw-headline";
const HEADING_WRAPPER_CLASS: &str = "mw-heading";

/// Where the rendered page lives and which of its blocks carry text.
#[derive(Debug, Clone)]
pub struct RenderedTarget {
    pub page_url: String,
    /// CSS selector of the element whose children are the page's blocks.
    pub content_root: String,
    /// Lowercase tag names collected as section text.
    pub text_tags: Vec<String>,
}

enum Block {
    Heading { level: u8, title: String },
    Other { tag: String },
}

enum Part<E> {
    Subheading(String),
    Block { element: E, tag: String },
}

pub struct RenderedSectionExtractor<'a, D: PageDriver> {
    driver: &'a D,
    target: &'a RenderedTarget,
}

impl<'a, D: PageDriver> RenderedSectionExtractor<'a, D> {
    pub fn new(driver: &'a D, target: &'a RenderedTarget) -> Self {
        Self { driver, target }
    }

    /// Visible text of the section titled `title`, blocks joined by one space.
    ///
    /// The heading itself is not part of the text. With
    /// [`SectionScope::Immediate`] collection stops at the first heading of
    /// any level; with [`SectionScope::Subtree`] lower-level subsections,
    /// including their headings, are collected too.
    pub async fn extract(&self, title: &str, scope: SectionScope) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        for part in self.walk(title, scope).await? {
            match part {
                Part::Subheading(text) => parts.push(text),
                Part::Block { element, tag } => {
                    if !self.target.text_tags.iter().any(|t| *t == tag) {
                        continue;
                    }
                    let text = self.driver.text(&element).await?;
                    let text = text.trim();
                    if !text.is_empty() {
                        parts.push(text.to_string());
                    }
                }
            }
        }

        debug!(
            target: "concord.rendered",
            url = %self.target.page_url,
            %title,
            ?scope,
            blocks = parts.len(),
            "section extracted"
        );
        Ok(parts.join(" "))
    }

    /// Non-heading blocks of the section titled `title`, whatever their tag.
    pub async fn section_blocks(&self, title: &str, scope: SectionScope) -> Result<Vec<D::Element>> {
        Ok(self
            .walk(title, scope)
            .await?
            .into_iter()
            .filter_map(|part| match part {
                Part::Block { element, .. } => Some(element),
                Part::Subheading(_) => None,
            })
            .collect())
    }

    /// Load the page and collect the run of blocks under the matching heading.
    async fn walk(&self, title: &str, scope: SectionScope) -> Result<Vec<Part<D::Element>>> {
        self.driver.navigate(&self.target.page_url).await?;

        let blocks_selector = format!("{} > *", self.target.content_root);
        let blocks = self.driver.locate(&blocks_selector).await?;
        if blocks.is_empty() {
            return Err(self.not_found(self.target.content_root.clone()));
        }

        let mut anchor: Option<u8> = None;
        let mut parts = Vec::new();

        for block in blocks {
            match (anchor, self.classify(&block).await?) {
                (None, Block::Heading { level, title: text }) if text == title => {
                    anchor = Some(level);
                }
                (None, _) => {}
                (Some(anchor_level), Block::Heading { level, title: text }) => {
                    if level <= anchor_level || scope == SectionScope::Immediate {
                        break;
                    }
                    parts.push(Part::Subheading(text));
                }
                (Some(_), Block::Other { tag }) => parts.push(Part::Block {
                    element: block,
                    tag,
                }),
            }
        }

        if anchor.is_none() {
            return Err(self.not_found(format!(
                "heading '{title}' under {}",
                self.target.content_root
            )));
        }
        Ok(parts)
    }

    /// Headings are either bare `h1`..`h6` or wrapped in `div.mw-heading`.
    async fn classify(&self, block: &D::Element) -> Result<Block> {
        let tag = self.driver.tag_name(block).await?;
        if let Some(level) = heading_level(&tag) {
            let title = self.heading_title(block).await?;
            return Ok(Block::Heading { level, title });
        }

        let class = self.driver.attribute(block, "class").await?;
        let wrapped = class
            .as_deref()
            .is_some_and(|c| c.split_whitespace().any(|c| c == HEADING_WRAPPER_CLASS));
        if wrapped {
            let inner = self.driver.locate_within(block, HEADING_SELECTOR).await?;
            if let Some(heading) = inner.first() {
                let inner_tag = self.driver.tag_name(heading).await?;
                if let Some(level) = heading_level(&inner_tag) {
                    let title = self.heading_title(heading).await?;
                    return Ok(Block::Heading { level, title });
                }
            }
        }
        Ok(Block::Other { tag })
    }

    /// Legacy markup keeps the title in `.mw-headline` next to the
    /// `[edit]` link; newer markup has the bare title in the heading.
    async fn heading_title(&self, heading: &D::Element) -> Result<String> {
        let headline = self.driver.locate_within(heading, HEADLINE_SELECTOR).await?;
        let text = match headline.first() {
            Some(el) => self.driver.text(el).await?,
            None => self.driver.text(heading).await?,
        };
        Ok(text.trim().to_string())
    }

    fn not_found(&self, query: String) -> CheckError {
        CheckError::ElementNotFound {
            url: self.target.page_url.clone(),
            query,
        }
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::heading_level;

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("h2"), Some(2));
        assert_eq!(heading_level("h6"), Some(6));
        assert_eq!(heading_level("p"), None);
        assert_eq!(heading_level("header"), None);
    }
}
