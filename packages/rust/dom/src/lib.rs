//! Page model, site layouts, and course row scraping.
//!
//! This crate provides:
//! - [`HtmlPage`]: a parsed page that supports the few mutations rendering needs
//! - [`layouts`]: per-host row/field/container locators ([`SiteLayout`], [`SiteVariant`])
//! - [`scrape`]: extraction of [`CourseRecord`](coursefeedback_shared::CourseRecord)s

pub mod layouts;
pub mod page;
pub mod scrape;

pub use ego_tree::NodeId;
pub use layouts::{ClassicLayout, FluidLayout, SiteLayout, SiteVariant};
pub use page::{HtmlPage, escape_html};
pub use scrape::{extract_row, scrape};
