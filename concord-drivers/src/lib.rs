//! Driver layer for browser automation.
//!
//! The checks only ever talk to the capability traits in [`capability`], so
//! any DOM-capable driver (or an in-memory fake) can stand in for a browser.
//!
//! - [`capability::PageDriver`]: navigate/locate/text/attribute/click/evaluate
//! - [`capability::PageSource`]: scoped acquisition and release of pages
//! - [`webdriver_browser::driver::WebDriverBrowser`]: fantoccini session wrapper
//! - [`webdriver_browser::page::WebDriverPage`]: one browser window as a [`PageDriver`]
//!
//! [`PageDriver`]: capability::PageDriver
pub mod capability;
pub mod webdriver_browser;

pub use capability::{PageDriver, PageSource};
