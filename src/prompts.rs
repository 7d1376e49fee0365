//! Prompt templates for the OCR task types.
//!
//! The wording below is what the Typhoon OCR models were tuned on, so it is
//! kept verbatim; both templates ask for a JSON object with a single
//! `natural_text` key. The `{base_text}` slot receives the page's anchor
//! text: its dimensions plus the positioned text runs and image regions the
//! source already has, which helps the model with reading order, layout and
//! rare glyphs.

use crate::config::TaskType;
use crate::pipeline::layout::{merge_image_boxes, TextElement};
use crate::pipeline::render::RenderedPage;
use std::cmp::Ordering;

const DEFAULT_TEMPLATE: &str = "Below is an image of a document page along with its dimensions. \
Simply return the markdown representation of this document, presenting tables in markdown format as they naturally appear.\n\
If the document contains images, use a placeholder like dummy.png for each image.\n\
Your final output must be in JSON format with a single key `natural_text` containing the response.\n\
RAW_TEXT_START\n{base_text}\nRAW_TEXT_END";

const STRUCTURE_TEMPLATE: &str = "Below is an image of a document page, along with its dimensions and possibly some raw textual content previously extracted from it. \
Note that the text extraction may be incomplete or partially missing. Carefully consider both the layout and any available text to reconstruct the document accurately.\n\
Your task is to return the markdown representation of this document, presenting tables in HTML format as they naturally appear.\n\
If the document contains images or figures, analyze them and include the tag <figure>IMAGE_ANALYSIS</figure> in the appropriate location.\n\
Your final output must be in JSON format with a single key `natural_text` containing the response.\n\
RAW_TEXT_START\n{base_text}\nRAW_TEXT_END";

/// The template for `task`, with `{base_text}` unfilled.
pub fn template(task: TaskType) -> &'static str {
    match task {
        TaskType::Default => DEFAULT_TEMPLATE,
        TaskType::Structure => STRUCTURE_TEMPLATE,
    }
}

/// Build the prompt for `task` around `base_text`.
pub fn build_prompt(task: TaskType, base_text: &str) -> String {
    template(task).replace("{base_text}", base_text)
}

/// Image boxes closer than this (in points) are reported as one region.
pub const IMAGE_MERGE_TOLERANCE: f32 = 0.5;

/// Longest text run kept in the anchor, after escaping.
const MAX_ELEMENT_LEN: usize = 250;

struct AnchorLine {
    x: f32,
    y: f32,
    line: String,
}

/// Anchor text for a rendered page, at most about `max_len` characters.
///
/// The first line gives the page dimensions. Each merged image region
/// follows as `[Image x0xy0 to x1xy1]`, then each text run as `[xxy]text`,
/// coordinates in points from the bottom-left corner. When everything does
/// not fit, the runs and regions at the page's outer edges are kept, the
/// rest is sampled evenly across content order until the budget runs out,
/// and the result is sorted by position.
pub fn anchor_text(page: &RenderedPage, max_len: usize) -> String {
    let mut anchor = format!("Page dimensions: {:.1}x{:.1}\n", page.width, page.height);
    if max_len < 20 {
        return anchor;
    }

    let images = merge_image_boxes(&page.layout.images, IMAGE_MERGE_TOLERANCE);
    let texts: Vec<&TextElement> = page
        .layout
        .text
        .iter()
        .filter(|t| !t.text.trim().is_empty())
        .collect();

    let mut lines: Vec<AnchorLine> = Vec::with_capacity(images.len() + texts.len());
    for b in &images {
        lines.push(AnchorLine {
            x: b.x0,
            y: b.y0,
            line: format!("[Image {:.0}x{:.0} to {:.0}x{:.0}]\n", b.x0, b.y0, b.x1, b.y1),
        });
    }
    for t in &texts {
        lines.push(AnchorLine {
            x: t.x,
            y: t.y,
            line: format!("[{:.0}x{:.0}]{}\n", t.x, t.y, clean_element_text(&t.text)),
        });
    }

    let header_len = anchor.chars().count();
    let lengths: Vec<usize> = lines.iter().map(|l| l.line.chars().count()).collect();
    if header_len + lengths.iter().sum::<usize>() <= max_len {
        for l in &lines {
            anchor.push_str(&l.line);
        }
        return anchor;
    }

    let mut selected = vec![false; lines.len()];
    let image_edges = [
        first_extreme(&images, |b| b.x0, Ordering::Less),
        first_extreme(&images, |b| b.x1, Ordering::Greater),
        first_extreme(&images, |b| b.y0, Ordering::Less),
        first_extreme(&images, |b| b.y1, Ordering::Greater),
    ];
    let text_edges = [
        first_extreme(&texts, |t| t.x, Ordering::Less),
        first_extreme(&texts, |t| t.x, Ordering::Greater),
        first_extreme(&texts, |t| t.y, Ordering::Less),
        first_extreme(&texts, |t| t.y, Ordering::Greater),
    ];
    for i in image_edges.into_iter().flatten() {
        selected[i] = true;
    }
    for i in text_edges.into_iter().flatten() {
        selected[images.len() + i] = true;
    }

    let mut used = header_len
        + lengths
            .iter()
            .zip(&selected)
            .filter(|&(_, &s)| s)
            .map(|(len, _)| len)
            .sum::<usize>();

    let pool: Vec<usize> = (0..lines.len()).filter(|&i| !selected[i]).collect();
    for slot in spread_order(pool.len()) {
        let i = pool[slot];
        if used + lengths[i] > max_len {
            break;
        }
        selected[i] = true;
        used += lengths[i];
    }

    let mut chosen: Vec<&AnchorLine> = lines
        .iter()
        .zip(&selected)
        .filter(|&(_, &s)| s)
        .map(|(l, _)| l)
        .collect();
    chosen.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    for l in chosen {
        anchor.push_str(&l.line);
    }
    anchor
}

/// Index of the first item whose key is the most `want` (`Less` for the
/// minimum, `Greater` for the maximum).
fn first_extreme<T>(items: &[T], key: impl Fn(&T) -> f32, want: Ordering) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, item) in items.iter().enumerate() {
        let k = key(item);
        match best {
            Some((_, b)) if k.total_cmp(&b) != want => {}
            _ => best = Some((i, k)),
        }
    }
    best.map(|(i, _)| i)
}

/// Visit `0..n` coarse to fine: every `2^k`-th index for shrinking `k`, so
/// any prefix is spread across the whole range.
fn spread_order(n: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(n);
    let mut seen = vec![false; n];
    let mut step = n.next_power_of_two();
    loop {
        for i in (0..n).step_by(step) {
            if !seen[i] {
                seen[i] = true;
                order.push(i);
            }
        }
        if step == 1 {
            break;
        }
        step /= 2;
    }
    order
}

/// Escape one text run for the anchor: trimmed, brackets and control
/// whitespace escaped, capped at 250 characters.
pub fn clean_element_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars() {
        match c {
            '[' => out.push_str("\\["),
            ']' => out.push_str("\\]"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    cap_split(&out, MAX_ELEMENT_LEN)
}

/// Shorten `text` to at most `max_len` characters by keeping its head and
/// tail around a `" ... "` marker, splitting on word boundaries when possible.
pub fn cap_split(text: &str, max_len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }

    let keep = (max_len / 2).saturating_sub(3);
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();

    let head = match head.rsplit_once(' ') {
        Some((h, _)) if !h.is_empty() => h.to_string(),
        _ => head,
    };
    let tail = match tail.split_once(' ') {
        Some((_, t)) if !t.is_empty() => t.to_string(),
        _ => tail,
    };

    format!("{head} ... {tail}")
}
