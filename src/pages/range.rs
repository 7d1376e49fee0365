//! Page-range codec: `"1,3,5-7"` ⇄ [`PageSet`].
//!
//! Parsing is permissive. A token that is not a number or a `start-end`
//! pair is skipped instead of failing the whole string, because the input
//! comes straight from a text field the user is still typing into.
//! Formatting is canonical: ascending, with consecutive runs merged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Upper bound applied to ranges when the document's page count is unknown.
///
/// Keeps `"1-4000000000"` from allocating billions of entries.
pub const MAX_PAGE_NUMBER: u32 = 100_000;

/// A set of 1-indexed page numbers.
///
/// An empty set means "all pages" to every consumer in this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageSet(BTreeSet<u32>);

impl PageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive range `start..=end`. Empty when `start > end`; page 0 is dropped.
    pub fn from_range(start: u32, end: u32) -> Self {
        (start.max(1)..=end).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.0.contains(&page)
    }

    /// Adds `page`; returns `false` if it was already present or is 0.
    pub fn insert(&mut self, page: u32) -> bool {
        page >= 1 && self.0.insert(page)
    }

    pub fn remove(&mut self, page: u32) -> bool {
        self.0.remove(&page)
    }

    /// Pages in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn first(&self) -> Option<u32> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }

    /// Members within `[1, total_pages]`.
    pub fn clamped(&self, total_pages: u32) -> PageSet {
        self.iter().filter(|&p| p <= total_pages).collect()
    }

    /// Ascending page list to process for a document of `total_pages`.
    ///
    /// An empty set expands to every page; otherwise the set is intersected
    /// with the valid range (which may leave nothing).
    pub fn resolve(&self, total_pages: u32) -> Vec<u32> {
        if self.is_empty() {
            (1..=total_pages).collect()
        } else {
            self.clamped(total_pages).iter().collect()
        }
    }
}

impl FromIterator<u32> for PageSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        PageSet(iter.into_iter().filter(|&p| p >= 1).collect())
    }
}

impl Extend<u32> for PageSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().filter(|&p| p >= 1));
    }
}

impl<'a> IntoIterator for &'a PageSet {
    type Item = u32;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, u32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

impl fmt::Display for PageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self))
    }
}

impl FromStr for PageSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse(s, None))
    }
}

/// Parse a page-range string.
///
/// Tokens are comma-separated; each is `N` or `start-end` (inclusive, a
/// reversed pair is swapped). Garbage tokens, zero, and negative numbers are
/// skipped. With `total_pages`, members outside `[1, total_pages]` are
/// dropped; without it ranges are capped at [`MAX_PAGE_NUMBER`].
///
/// ```
/// use typhoon_ocr::pages::range::parse;
///
/// let set = parse("1,3,5-7", None);
/// assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 5, 6, 7]);
/// assert!(parse("  ", Some(10)).is_empty());
/// ```
pub fn parse(input: &str, total_pages: Option<u32>) -> PageSet {
    let upper = total_pages.unwrap_or(MAX_PAGE_NUMBER);
    let mut set = PageSet::new();

    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if let Some((start, end)) = token.split_once('-') {
            let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>())
            else {
                continue;
            };
            let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
            if lo > upper {
                continue;
            }
            set.extend(lo.max(1)..=hi.min(upper));
        } else if let Ok(page) = token.parse::<u32>() {
            if page <= upper {
                set.insert(page);
            }
        }
    }

    set
}

/// Format a set as its canonical range string: `{1,2,3,5}` → `"1-3,5"`.
///
/// The empty set formats to the empty string.
pub fn format(set: &PageSet) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut pages = set.iter();

    let Some(mut start) = pages.next() else {
        return String::new();
    };
    let mut end = start;

    for page in pages {
        if page == end + 1 {
            end = page;
            continue;
        }
        parts.push(span(start, end));
        start = page;
        end = page;
    }
    parts.push(span(start, end));

    parts.join(",")
}

fn span(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(set: &PageSet) -> Vec<u32> {
        set.iter().collect()
    }

    #[test]
    fn parses_singles_and_ranges() {
        assert_eq!(pages(&parse("1,3,5-7", None)), vec![1, 3, 5, 6, 7]);
    }

    #[test]
    fn formats_runs() {
        let set: PageSet = [1, 2, 3, 5].into_iter().collect();
        assert_eq!(format(&set), "1-3,5");
        assert_eq!(format(&PageSet::new()), "");
        let pair: PageSet = [4, 5].into_iter().collect();
        assert_eq!(format(&pair), "4-5");
    }

    #[test]
    fn empty_and_whitespace_mean_all() {
        assert!(parse("", None).is_empty());
        assert!(parse("   ", Some(4)).is_empty());
        assert!(parse(" , ,", None).is_empty());
    }

    #[test]
    fn garbage_tokens_are_skipped() {
        assert_eq!(pages(&parse("abc, 2, x-3, 4-y, 7", None)), vec![2, 7]);
        assert_eq!(pages(&parse("0,-3,2", None)), vec![2]);
        assert_eq!(pages(&parse("1-2-3, 5", None)), vec![5]);
    }

    #[test]
    fn reversed_range_is_swapped() {
        assert_eq!(pages(&parse("7-5", None)), vec![5, 6, 7]);
    }

    #[test]
    fn total_pages_bounds_members() {
        assert_eq!(pages(&parse("2,8-12,40", Some(10))), vec![2, 8, 9, 10]);
        assert!(parse("11-20", Some(10)).is_empty());
    }

    #[test]
    fn unbounded_range_is_capped() {
        let set = parse("1-4000000000", None);
        assert_eq!(set.len(), MAX_PAGE_NUMBER as usize);
    }

    #[test]
    fn overlapping_tokens_merge() {
        let set = parse("5-7,1,6-9,2", None);
        assert_eq!(format(&set), "1-2,5-9");
    }

    #[test]
    fn format_parse_is_a_fixed_point() {
        for input in ["1,3,5-7", "9-7, 2 ,2,3", "", "x,4-4,10-12,11", "1-3,5", "100"] {
            let once = parse(input, None);
            let again = parse(&format(&once), None);
            assert_eq!(once, again, "input: {input:?}");
        }
    }

    #[test]
    fn resolve_expands_empty_and_intersects() {
        assert_eq!(PageSet::new().resolve(3), vec![1, 2, 3]);
        assert_eq!(parse("2,5", None).resolve(3), vec![2]);
        assert!(parse("5", None).resolve(3).is_empty());
    }

    #[test]
    fn display_and_from_str_agree() {
        let set: PageSet = "3,1,2".parse().unwrap();
        assert_eq!(set.to_string(), "1-3");
    }

    #[test]
    fn page_zero_is_never_a_member() {
        let mut set = PageSet::new();
        assert!(!set.insert(0));
        assert!(PageSet::from_range(0, 2).iter().eq([1, 2]));
    }
}
