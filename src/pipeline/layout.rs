//! Positioned page content: text runs and image regions in PDF user space.
//!
//! Coordinates are points with the origin at the bottom-left corner of the
//! page, as pdfium reports them. The renderer fills a [`PageLayout`]; the
//! prompt builder turns it into anchor text.

/// An axis-aligned box, `(x0, y0)` bottom-left to `(x1, y1)` top-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Box spanning two corners given in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// True when the horizontal and vertical gaps are both within `tolerance`.
    /// Overlapping boxes have a gap of zero.
    pub fn touches(&self, other: &BoundingBox, tolerance: f32) -> bool {
        let h_gap = (self.x0.max(other.x0) - self.x1.min(other.x1)).max(0.0);
        let v_gap = (self.y0.max(other.y0) - self.y1.min(other.y1)).max(0.0);
        h_gap <= tolerance && v_gap <= tolerance
    }
}

/// A run of text starting at `(x, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

impl TextElement {
    pub fn new(x: f32, y: f32, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            text: text.into(),
        }
    }
}

/// What a page's content stream says is where.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    /// Text runs in content order.
    pub text: Vec<TextElement>,
    /// Image object bounds, unmerged.
    pub images: Vec<BoundingBox>,
}

impl PageLayout {
    pub fn is_empty(&self) -> bool {
        self.text.iter().all(|t| t.text.trim().is_empty()) && self.images.is_empty()
    }
}

/// Merge image boxes that overlap or lie within `tolerance` of each other,
/// transitively. Groups come out in order of their first member.
///
/// Scanned pages are often stored as many image strips; merged, they read
/// as one figure.
pub fn merge_image_boxes(boxes: &[BoundingBox], tolerance: f32) -> Vec<BoundingBox> {
    let n = boxes.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if boxes[i].touches(&boxes[j], tolerance) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut roots: Vec<usize> = Vec::new();
    let mut merged: Vec<BoundingBox> = Vec::new();
    for (i, bbox) in boxes.iter().enumerate() {
        let root = find(&mut parent, i);
        match roots.iter().position(|&r| r == root) {
            Some(slot) => merged[slot] = merged[slot].union(bbox),
            None => {
                roots.push(root);
                merged.push(*bbox);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalised() {
        let b = BoundingBox::new(10.0, 50.0, 0.0, 20.0);
        assert_eq!(b, BoundingBox { x0: 0.0, y0: 20.0, x1: 10.0, y1: 50.0 });
    }

    #[test]
    fn touching_boxes_merge_transitively() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 100.0, 10.0),
            BoundingBox::new(0.0, 10.3, 100.0, 20.0),
            BoundingBox::new(0.0, 20.0, 100.0, 30.0),
            BoundingBox::new(300.0, 300.0, 400.0, 400.0),
        ];
        let merged = merge_image_boxes(&boxes, 0.5);
        assert_eq!(
            merged,
            vec![
                BoundingBox::new(0.0, 0.0, 100.0, 30.0),
                BoundingBox::new(300.0, 300.0, 400.0, 400.0),
            ]
        );
    }

    #[test]
    fn distant_boxes_stay_apart() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(11.0, 0.0, 20.0, 10.0),
        ];
        assert_eq!(merge_image_boxes(&boxes, 0.5).len(), 2);
        assert!(merge_image_boxes(&[], 0.5).is_empty());
    }

    #[test]
    fn blank_text_counts_as_empty() {
        let layout = PageLayout {
            text: vec![TextElement::new(0.0, 0.0, "  ")],
            images: vec![],
        };
        assert!(layout.is_empty());
    }
}
