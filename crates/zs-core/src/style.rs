//! Keyed style element bookkeeping
//!
//! A page's style tree is modelled as a set of style elements addressed by
//! id. Installing under an existing id replaces the content in place, so at
//! most one element exists per id; installing identical content is a no-op
//! so the page does not reflow for nothing.

use std::collections::BTreeMap;

/// A page's style tree, addressed by element id.
pub trait StyleHost {
    /// Text of the style element with this id, if present.
    fn style_text(&self, id: &str) -> Option<String>;
    /// Create the element, or replace its text if it exists.
    fn write_style(&mut self, id: &str, css: &str);
    /// Remove the element. Returns whether it existed.
    fn remove_style(&mut self, id: &str) -> bool;
    /// Ids of all style elements whose id starts with `prefix`.
    fn style_ids(&self, prefix: &str) -> Vec<String>;
}

/// What an install or removal did to the style tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleChange {
    Inserted,
    Replaced,
    Unchanged,
    Removed,
    Absent,
}

/// Install `css` under `id`, touching the tree only if the content differs.
pub fn inject_style<H: StyleHost + ?Sized>(host: &mut H, id: &str, css: &str) -> StyleChange {
    match host.style_text(id) {
        Some(existing) if existing == css => StyleChange::Unchanged,
        Some(_) => {
            host.write_style(id, css);
            StyleChange::Replaced
        }
        None => {
            host.write_style(id, css);
            StyleChange::Inserted
        }
    }
}

pub fn remove_style<H: StyleHost + ?Sized>(host: &mut H, id: &str) -> StyleChange {
    if host.remove_style(id) {
        StyleChange::Removed
    } else {
        StyleChange::Absent
    }
}

/// Stylesheet forcing every selector to `display: none`.
pub fn hide_css(selectors: &[&str]) -> String {
    selectors
        .iter()
        .map(|selector| format!("{selector} {{ display: none !important; }}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// In-memory style tree, for tests and for previewing what a page gets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheetSet {
    sheets: BTreeMap<String, String>,
    writes: usize,
}

impl StyleSheetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Number of writes that reached the tree.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sheets.iter().map(|(id, css)| (id.as_str(), css.as_str()))
    }
}

impl StyleHost for StyleSheetSet {
    fn style_text(&self, id: &str) -> Option<String> {
        self.sheets.get(id).cloned()
    }

    fn write_style(&mut self, id: &str, css: &str) {
        self.writes += 1;
        self.sheets.insert(id.to_string(), css.to_string());
    }

    fn remove_style(&mut self, id: &str) -> bool {
        let removed = self.sheets.remove(id).is_some();
        if removed {
            self.writes += 1;
        }
        removed
    }

    fn style_ids(&self, prefix: &str) -> Vec<String> {
        self.sheets
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect()
    }
}
