//! Page selection: the range-string codec and the selection state built on it.
//!
//! [`range`] converts between what the user types (`"1,3,5-7"`) and a
//! [`PageSet`]; [`selection`] implements the click, shift-click, preset, and
//! custom-range actions as pure functions over `PageSet`.

pub mod range;
pub mod selection;

pub use range::PageSet;
pub use selection::{QuickSelect, Selection};
