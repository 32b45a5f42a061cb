//! Binding between renderers and the page.
//!
//! Renderers only know that a named region can be filled with HTML; the
//! templates decide where each region ends up.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Title,
    Authors,
    UploadTime,
    Abstract,
    Summary,
    KeyContent,
    Translation,
    Terminology,
    ResearchContext,
    RelatedPapers,
    /// URL for the PDF frame (not HTML).
    PdfSource,
}

pub trait ViewBinding {
    fn set_section(&mut self, slot: Slot, html: String);
}

/// In-memory page regions, read back by the templates.
#[derive(Debug, Clone, Default)]
pub struct PageView {
    sections: HashMap<Slot, String>,
}

impl PageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> &str {
        self.sections.get(&slot).map(String::as_str).unwrap_or("")
    }

    pub fn is_set(&self, slot: Slot) -> bool {
        self.sections.contains_key(&slot)
    }
}

impl ViewBinding for PageView {
    fn set_section(&mut self, slot: Slot, html: String) {
        self.sections.insert(slot, html);
    }
}
