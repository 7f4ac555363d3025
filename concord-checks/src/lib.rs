//! Consistency and affordance checks for rendered wiki pages.
//!
//! The central check compares one section of a page as a browser renders it
//! with the same section as the MediaWiki parse API returns it: both sides
//! are normalized ([`normalize`]) and their unique-word counts compared
//! ([`consistency`]). Two UI checks run on the same page: anchors must have a
//! real destination, and the theme toggle must flip its marker
//! ([`affordance`]).
//!
//! Browser access goes through [`concord_drivers::PageDriver`], so any
//! implementation (a WebDriver session, a fake DOM in tests) can back the
//! rendered side.
//!
//! # Example
//!
//! ```rust
//! use concord_checks::consistency::compare_texts;
//!
//! let result = compare_texts(
//!     "History",
//!     "Released in 2020.",
//!     "<p>Released in <a href=\"/wiki/2020\">2020</a>.</p>",
//! );
//! assert!(result.equal);
//! assert_eq!(result.rendered_words, 3);
//! ```
pub mod affordance;
pub mod api;
pub mod consistency;
pub mod normalize;
pub mod rendered;
pub mod suite;

pub use affordance::{
    LinkAudit, LinkViolation, ThemeToggle, ThemeTransition, audit_link_scope, audit_links,
    audit_section_links, check_theme_toggle, links_valid, theme_active, toggle_theme,
};
pub use api::{MediaWikiApi, SectionDescriptor, page_title_from_url};
pub use consistency::{ComparisonResult, ConsistencyChecker, compare_texts};
pub use rendered::{RenderedSectionExtractor, RenderedTarget};
pub use suite::{CheckOutcome, PlannedCheck, SuitePlan, SuiteReport, Verdict, run_suite};
