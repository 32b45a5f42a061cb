//! HTML templates and styling for the paper desk.
//!
//! ## Module Structure
//!
//! - `styles` - CSS constants
//! - `components` - navigation tabs, notification banner, loading overlay, base page
//! - `pages` - bodies of the upload, papers, chat and viewer tabs

mod components;
mod pages;
mod styles;

pub use components::{base_html, loading_html, nav_bar, notification_html, PageChrome};
pub use pages::{chat_tab, papers_tab, upload_tab, viewer_tab};
pub use styles::STYLE;
