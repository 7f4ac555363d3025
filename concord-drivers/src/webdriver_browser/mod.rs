//! fantoccini-backed implementation of the capability traits.
pub mod driver;
pub mod page;

pub use driver::WebDriverBrowser;
pub use page::{PageElement, WebDriverPage};
