//! Common types and utilities shared across Concord crates.
//!
//! This crate defines the error taxonomy, the check options that both the
//! configuration loader and the checks understand, and observability helpers.
//! It stays dependency‑minimal so that every crate can depend on it.
//!
//! # Overview
//!
//! - [`CheckError`] and [`Result`]: terminal failures of a single check
//! - [`SectionScope`]: boundary of a rendered section (immediate vs. subtree)
//! - [`ApiContent`]: parsed text or wikitext from the API
//! - [`LinkCheckPolicy`]: fail‑fast or collect‑all link auditing
//! - [`LinkScope`]: CSS container or rendered section holding the links
//! - [`ThemeMarker`]: observable state marker for a theme toggle
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! ```rust
//! use concord_common::{CheckError, SectionScope};
//!
//! assert_eq!(SectionScope::default(), SectionScope::Subtree);
//!
//! let err = CheckError::SectionNotFound {
//!     page: "Playwright_(software)".into(),
//!     title: "Debugging features".into(),
//! };
//! assert_eq!(err.kind(), "section_not_found");
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// How far a rendered section extends past its heading.
///
/// The API side always returns a section together with its subsections, so
/// [`SectionScope::Subtree`] is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionScope {
    /// Stop at the next heading of any level.
    Immediate,
    /// Include nested lower-level subsections (and their headings).
    #[default]
    Subtree,
}

/// Which representation of a section the API is asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiContent {
    /// Parser output (`prop=text`): HTML, compared after markup stripping.
    #[default]
    Text,
    /// Source markup (`prop=wikitext`), compared as-is.
    Wikitext,
}

/// Whether the link audit stops at the first broken link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCheckPolicy {
    #[default]
    FailFast,
    CollectAll,
}

/// Where a link audit looks for anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkScope {
    /// Descendants of every element matching a CSS selector.
    Container(String),
    /// Blocks of the rendered section with this heading title, subsections
    /// included. Headings themselves are skipped.
    Section(String),
}

impl std::fmt::Display for LinkScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkScope::Container(selector) => f.write_str(selector),
            LinkScope::Section(title) => write!(f, "section:{title}"),
        }
    }
}

/// Observable marker that reflects the active theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThemeMarker {
    /// `class` present on the first element matching `selector`.
    Class { selector: String, class: String },
    /// Attribute `name` present on `selector`, optionally with an exact value.
    Attribute {
        selector: String,
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    /// Script evaluated in the page; must return a boolean.
    Script { script: String },
}

/// Terminal failure of the check in progress.
///
/// None of these are retried or downgraded; the caller reports the kind
/// together with the page/section context carried by the variant.
#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    /// No section in the API listing carries this exact title.
    #[error("section not found: '{title}' on page '{page}'")]
    SectionNotFound { page: String, title: String },

    /// Transport failure or non-success status from the API.
    #[error("API request failed for page '{page}' (status {}): {message}", .status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()))]
    ApiRequestFailed {
        page: String,
        status: Option<u16>,
        message: String,
    },

    /// A successful API response is missing an expected field.
    #[error("malformed API response for page '{page}': missing or invalid {field}")]
    MalformedResponse { page: String, field: String },

    /// A structural query matched nothing in the rendered page.
    #[error("element not found on {url}: {query}")]
    ElementNotFound { url: String, query: String },

    /// The automation driver reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),
}

impl CheckError {
    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::SectionNotFound { .. } => "section_not_found",
            CheckError::ApiRequestFailed { .. } => "api_request_failed",
            CheckError::MalformedResponse { .. } => "malformed_response",
            CheckError::ElementNotFound { .. } => "element_not_found",
            CheckError::Driver(_) => "driver",
        }
    }
}

/// Convenient alias for results that use [`CheckError`].
pub type Result<T> = std::result::Result<T, CheckError>;
