//! Port supplying layout measurements for a scroll region.

use crate::domain::entities::{Span, Viewport, ViewportKey};

/// Measures a scroll region and the items currently rendered inside it.
///
/// The platform adapter reads live layout; tests supply fixed boxes.
pub trait BoundsProvider: Send + Sync {
    /// Current scroll state of the region.
    fn viewport(&self) -> Viewport;

    /// Candidate items with their extents along the scroll axis.
    fn items(&self) -> Vec<(ViewportKey, Span)>;
}
