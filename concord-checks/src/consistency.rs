//! Section consistency: rendered text against API text, compared by
//! unique-word count after normalization.
use crate::api::MediaWikiApi;
use crate::normalize::{normalize, unique_words};
use crate::rendered::{RenderedSectionExtractor, RenderedTarget};
use concord_common::{ApiContent, Result, SectionScope};
use concord_drivers::PageDriver;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of one section comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub title: String,
    /// Unique words in the rendered section.
    pub rendered_words: usize,
    /// Unique words in the API section.
    pub api_words: usize,
    pub equal: bool,
}

/// Compares one section of a rendered page with the same section from the API.
///
/// Only the unique-word *count* is compared, not the token sets.
pub struct ConsistencyChecker<'a, D: PageDriver> {
    rendered: RenderedSectionExtractor<'a, D>,
    api: &'a MediaWikiApi,
    scope: SectionScope,
    content: ApiContent,
}

impl<'a, D: PageDriver> ConsistencyChecker<'a, D> {
    pub fn new(driver: &'a D, target: &'a RenderedTarget, api: &'a MediaWikiApi) -> Self {
        Self {
            rendered: RenderedSectionExtractor::new(driver, target),
            api,
            scope: SectionScope::default(),
            content: ApiContent::default(),
        }
    }

    pub fn with_scope(mut self, scope: SectionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_content(mut self, content: ApiContent) -> Self {
        self.content = content;
        self
    }

    /// Rendered text first, then title resolution, then API text; strictly
    /// in that order so failures reproduce deterministically.
    pub async fn check_section_consistency(&self, title: &str) -> Result<ComparisonResult> {
        let rendered_raw = self.rendered.extract(title, self.scope).await?;
        let section = self.api.resolve_section(title).await?;
        let api_raw = self.api.section_text(&section, self.content).await?;

        let result = compare_texts(title, &rendered_raw, &api_raw);
        info!(
            target: "concord.consistency",
            page = %self.api.page(),
            %title,
            index = section.index,
            rendered_words = result.rendered_words,
            api_words = result.api_words,
            equal = result.equal,
            "section compared"
        );
        Ok(result)
    }
}

/// Normalize both raw texts and compare their unique-word counts.
pub fn compare_texts(title: &str, rendered_raw: &str, api_raw: &str) -> ComparisonResult {
    let rendered = normalize(rendered_raw);
    let api = normalize(api_raw);
    let rendered_set = unique_words(&rendered);
    let api_set = unique_words(&api);

    let result = ComparisonResult {
        title: title.to_string(),
        rendered_words: rendered_set.len(),
        api_words: api_set.len(),
        equal: rendered_set.len() == api_set.len(),
    };

    if !result.equal {
        let only_rendered: Vec<&str> = rendered_set.difference(&api_set).copied().collect();
        let only_api: Vec<&str> = api_set.difference(&rendered_set).copied().collect();
        debug!(
            target: "concord.consistency",
            %title,
            ?only_rendered,
            ?only_api,
            "unique word sets differ"
        );
    }
    result
}
