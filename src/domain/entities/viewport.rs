use std::collections::HashSet;

use super::{FileId, MessageKey};

/// Identifies one trackable item inside a scroll region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewportKey {
    /// A message bubble in a chat history.
    Message(MessageKey),
    /// A saved animation in a picker strip.
    Animation(FileId),
    /// A block of an instant-view page, by position.
    PageBlock(usize),
}

impl std::fmt::Display for ViewportKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(key) => write!(f, "message:{key}"),
            Self::Animation(id) => write!(f, "animation:{id}"),
            Self::PageBlock(index) => write!(f, "block:{index}"),
        }
    }
}

/// Vertical extent of an item along the scroll axis, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    /// Top edge.
    pub start: f64,
    /// Bottom edge.
    pub end: f64,
}

impl Span {
    /// Creates a span, normalising reversed bounds.
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Returns true if the span shares any point with `other`.
    ///
    /// Checks all four placements explicitly; items taller than the
    /// viewport must still count as visible.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        let contained = self.start >= other.start && self.end <= other.end;
        let straddles_top = self.start < other.start && self.end >= other.start;
        let straddles_bottom = self.start <= other.end && self.end > other.end;
        let spans = self.start <= other.start && self.end >= other.end;
        contained || straddles_top || straddles_bottom || spans
    }
}

/// Scroll state of a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Current scroll offset (scrollTop).
    pub offset: f64,
    /// Visible height of the region.
    pub extent: f64,
    /// Full scrollable height of the region's content.
    pub content_extent: f64,
}

impl Viewport {
    /// Creates a viewport.
    #[must_use]
    pub const fn new(offset: f64, extent: f64, content_extent: f64) -> Self {
        Self {
            offset,
            extent,
            content_extent,
        }
    }

    /// The visible window widened by `padding` on both sides.
    #[must_use]
    pub fn padded_window(&self, padding: f64) -> Span {
        Span::new(self.offset - padding, self.offset + self.extent + padding)
    }

    /// Returns true if scrolled to the top or bottom, within `epsilon`.
    #[must_use]
    pub fn is_at_edge(&self, epsilon: f64) -> bool {
        let max_offset = (self.content_extent - self.extent).max(0.0);
        self.offset <= epsilon || self.offset >= max_offset - epsilon
    }
}

/// Set of keys currently intersecting a region's visible window.
///
/// Equality is set equality, independent of discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilitySet(HashSet<ViewportKey>);

impl VisibilitySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is visible.
    #[must_use]
    pub fn contains(&self, key: &ViewportKey) -> bool {
        self.0.contains(key)
    }

    /// Number of visible keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates visible keys in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ViewportKey> {
        self.0.iter()
    }
}

impl FromIterator<ViewportKey> for VisibilitySet {
    fn from_iter<I: IntoIterator<Item = ViewportKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(120.0, 200.0, true ; "contained")]
    #[test_case(50.0, 120.0, true ; "straddles_top")]
    #[test_case(250.0, 350.0, true ; "straddles_bottom")]
    #[test_case(0.0, 500.0, true ; "spans_viewport")]
    #[test_case(310.0, 400.0, false ; "below")]
    #[test_case(0.0, 90.0, false ; "above")]
    fn test_span_intersection(start: f64, end: f64, expected: bool) {
        let window = Span::new(100.0, 300.0);
        assert_eq!(Span::new(start, end).intersects(&window), expected);
    }

    #[test]
    fn test_edge_detection() {
        let top = Viewport::new(0.0, 300.0, 1000.0);
        let middle = Viewport::new(350.0, 300.0, 1000.0);
        let bottom = Viewport::new(699.5, 300.0, 1000.0);

        assert!(top.is_at_edge(1.0));
        assert!(!middle.is_at_edge(1.0));
        assert!(bottom.is_at_edge(1.0));
    }

    #[test]
    fn test_visibility_set_equality_ignores_order() {
        let a: VisibilitySet = [ViewportKey::PageBlock(1), ViewportKey::PageBlock(2)]
            .into_iter()
            .collect();
        let b: VisibilitySet = [ViewportKey::PageBlock(2), ViewportKey::PageBlock(1)]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }
}
