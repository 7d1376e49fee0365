//! Page-selection state as a value type plus pure transformations.
//!
//! Every operation takes a [`PageSet`] and returns a new one. The only piece
//! of interaction memory, the last clicked page, is an explicit argument to
//! [`extend_range`] and a plain field on [`Selection`], never hidden state.

use super::range::{self, PageSet};
use serde::{Deserialize, Serialize};

/// Flip membership of `page`.
pub fn toggle(set: &PageSet, page: u32) -> PageSet {
    let mut next = set.clone();
    if !next.remove(page) {
        next.insert(page);
    }
    next
}

/// Add every page between `last_clicked` and `page`, inclusive, in either
/// order. Falls back to [`toggle`] when nothing was clicked before.
///
/// Pages past [`range::MAX_PAGE_NUMBER`] are never added.
pub fn extend_range(set: &PageSet, last_clicked: Option<u32>, page: u32) -> PageSet {
    let Some(anchor) = last_clicked else {
        return toggle(set, page);
    };
    let (lo, hi) = if anchor <= page { (anchor, page) } else { (page, anchor) };
    let mut next = set.clone();
    if lo <= range::MAX_PAGE_NUMBER {
        next.extend(lo..=hi.min(range::MAX_PAGE_NUMBER));
    }
    next
}

/// Pages `1..=total_pages`.
pub fn select_all(total_pages: u32) -> PageSet {
    PageSet::from_range(1, total_pages)
}

/// The empty selection, meaning "all pages" downstream.
pub fn clear() -> PageSet {
    PageSet::new()
}

pub fn odd_pages(total_pages: u32) -> PageSet {
    (1..=total_pages).filter(|p| p % 2 == 1).collect()
}

pub fn even_pages(total_pages: u32) -> PageSet {
    (1..=total_pages).filter(|p| p % 2 == 0).collect()
}

/// Inclusive range from two user-entered bounds, clamped instead of rejected.
///
/// `from` is clamped to `[1, total_pages]`; `to` is clamped to
/// `[1, total_pages]` and, if it then lies below `from`, the pair is swapped.
/// A document with no pages yields the empty set.
pub fn apply_custom_range(from: i64, to: i64, total_pages: u32) -> PageSet {
    if total_pages == 0 {
        return PageSet::new();
    }
    let max = i64::from(total_pages);
    let from = from.clamp(1, max) as u32;
    let to = to.clamp(1, max) as u32;
    let (lo, hi) = if to < from { (to, from) } else { (from, to) };
    PageSet::from_range(lo, hi)
}

/// Preset selections a toolbar can highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickSelect {
    All,
    Odd,
    Even,
}

impl QuickSelect {
    /// The set this preset selects in a document of `total_pages`.
    pub fn pages(self, total_pages: u32) -> PageSet {
        match self {
            QuickSelect::All => select_all(total_pages),
            QuickSelect::Odd => odd_pages(total_pages),
            QuickSelect::Even => even_pages(total_pages),
        }
    }

    /// Which preset `set` equals, by set equality.
    ///
    /// `All` wins over `Odd` for a one-page document, where both match.
    pub fn detect(set: &PageSet, total_pages: u32) -> Option<QuickSelect> {
        if set.is_empty() {
            return None;
        }
        [QuickSelect::All, QuickSelect::Odd, QuickSelect::Even]
            .into_iter()
            .find(|preset| preset.pages(total_pages) == *set)
    }
}

/// Selection state for one loaded document.
///
/// Wraps the pure functions above and remembers the last clicked page so
/// a modifier-click can extend from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pages: PageSet,
    last_clicked: Option<u32>,
    total_pages: u32,
}

impl Selection {
    pub fn new(total_pages: u32) -> Self {
        Self {
            pages: PageSet::new(),
            last_clicked: None,
            total_pages,
        }
    }

    pub fn pages(&self) -> &PageSet {
        &self.pages
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn last_clicked(&self) -> Option<u32> {
        self.last_clicked
    }

    /// Canonical range string; empty when nothing is selected.
    pub fn range_string(&self) -> String {
        range::format(&self.pages)
    }

    /// Click on a page thumbnail. With `extend` (shift-click) the range from
    /// the previous click is added; otherwise the page is toggled.
    /// Clicks outside the document are ignored.
    pub fn click(&mut self, page: u32, extend: bool) {
        if page == 0 || page > self.total_pages {
            return;
        }
        self.pages = if extend {
            extend_range(&self.pages, self.last_clicked, page)
        } else {
            toggle(&self.pages, page)
        };
        self.last_clicked = Some(page);
    }

    pub fn select_all(&mut self) {
        self.pages = select_all(self.total_pages);
    }

    pub fn clear(&mut self) {
        self.pages = clear();
        self.last_clicked = None;
    }

    pub fn quick_select(&mut self, preset: QuickSelect) {
        self.pages = preset.pages(self.total_pages);
    }

    pub fn apply_custom_range(&mut self, from: i64, to: i64) {
        self.pages = apply_custom_range(from, to, self.total_pages);
    }

    /// Replace the selection from a typed range string (permissive).
    pub fn set_range_string(&mut self, input: &str) {
        self.pages = range::parse(input, Some(self.total_pages));
    }

    pub fn active_preset(&self) -> Option<QuickSelect> {
        QuickSelect::detect(&self.pages, self.total_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pages: &[u32]) -> PageSet {
        pages.iter().copied().collect()
    }

    #[test]
    fn extend_range_stops_at_the_page_ceiling() {
        let wide = extend_range(&PageSet::new(), Some(1), u32::MAX);
        assert_eq!(wide.len(), range::MAX_PAGE_NUMBER as usize);
        assert!(wide.contains(range::MAX_PAGE_NUMBER));

        let beyond = extend_range(&set(&[4]), Some(u32::MAX - 1), u32::MAX);
        assert_eq!(beyond, set(&[4]));
    }

    #[test]
    fn toggle_flips_membership() {
        assert_eq!(toggle(&set(&[2, 3]), 2), set(&[3]));
        assert_eq!(toggle(&set(&[3]), 2), set(&[2, 3]));
    }

    #[test]
    fn extend_range_is_order_independent() {
        assert_eq!(extend_range(&set(&[]), Some(2), 5), set(&[2, 3, 4, 5]));
        assert_eq!(extend_range(&set(&[]), Some(5), 2), set(&[2, 3, 4, 5]));
        assert_eq!(extend_range(&set(&[9]), Some(2), 3), set(&[2, 3, 9]));
    }

    #[test]
    fn extend_range_without_anchor_toggles() {
        assert_eq!(extend_range(&set(&[4]), None, 4), set(&[]));
        assert_eq!(extend_range(&set(&[]), None, 4), set(&[4]));
    }

    #[test]
    fn select_all_clear_odd_even() {
        assert_eq!(select_all(4), set(&[1, 2, 3, 4]));
        assert!(clear().is_empty());
        assert_eq!(odd_pages(5), set(&[1, 3, 5]));
        assert_eq!(even_pages(5), set(&[2, 4]));
        assert!(even_pages(1).is_empty());
    }

    #[test]
    fn custom_range_swaps_reversed_bounds() {
        assert_eq!(apply_custom_range(5, 2, 10), set(&[2, 3, 4, 5]));
    }

    #[test]
    fn custom_range_clamps_to_document() {
        assert_eq!(apply_custom_range(-3, 100, 10), PageSet::from_range(1, 10));
        assert_eq!(apply_custom_range(50, 60, 10), set(&[10]));
        assert!(apply_custom_range(1, 5, 0).is_empty());
    }

    #[test]
    fn quick_select_detection_uses_set_equality() {
        assert_eq!(QuickSelect::detect(&set(&[1, 2, 3]), 3), Some(QuickSelect::All));
        assert_eq!(QuickSelect::detect(&set(&[3, 1]), 4), Some(QuickSelect::Odd));
        assert_eq!(QuickSelect::detect(&set(&[2, 4]), 4), Some(QuickSelect::Even));
        assert_eq!(QuickSelect::detect(&set(&[2]), 4), None);
        assert_eq!(QuickSelect::detect(&set(&[]), 4), None);
        assert_eq!(QuickSelect::detect(&set(&[1]), 1), Some(QuickSelect::All));
    }

    #[test]
    fn selection_click_and_shift_click() {
        let mut sel = Selection::new(10);
        sel.click(3, false);
        sel.click(6, true);
        assert_eq!(sel.range_string(), "3-6");
        sel.click(4, false);
        assert_eq!(sel.range_string(), "3,5-6");
        assert_eq!(sel.last_clicked(), Some(4));
    }

    #[test]
    fn selection_ignores_out_of_document_clicks() {
        let mut sel = Selection::new(2);
        sel.click(5, false);
        sel.click(0, true);
        assert!(sel.pages().is_empty());
        assert_eq!(sel.last_clicked(), None);
    }

    #[test]
    fn selection_typed_range_is_bounded() {
        let mut sel = Selection::new(5);
        sel.set_range_string("1,4-9,oops");
        assert_eq!(sel.range_string(), "1,4-5");
        sel.quick_select(QuickSelect::Even);
        assert_eq!(sel.active_preset(), Some(QuickSelect::Even));
        sel.clear();
        assert_eq!(sel.active_preset(), None);
    }
}
