//! Viewport membership tracking for scrollable regions.
//!
//! Recomputation is rate limited per region: during continuous scrolling at
//! most once per throttle window, plus a trailing pass once scrolling has
//! been quiet for the debounce delay. Resizes only schedule the trailing
//! pass. Samples that jump further than the fast-scroll threshold away from
//! an edge are skipped outright; the trailing pass settles them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::entities::{Span, Viewport, ViewportKey, VisibilitySet};
use crate::domain::ports::BoundsProvider;
use crate::domain::signal::{Signal, Subscription};

/// Tuning for visibility recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityConfig {
    /// Extra margin around the viewport that still counts as visible.
    pub padding: f64,
    /// Minimum spacing of recomputations during continuous scroll.
    pub scroll_throttle: Duration,
    /// Quiet time after the last scroll before the trailing pass.
    pub scroll_debounce: Duration,
    /// Quiet time after the last resize before recomputing.
    pub resize_debounce: Duration,
    /// Scroll jumps larger than this (in px) skip recomputation.
    pub fast_scroll_threshold: f64,
    /// Distance from top or bottom that still counts as at the edge.
    pub edge_epsilon: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            padding: 0.0,
            scroll_throttle: Duration::from_millis(250),
            scroll_debounce: Duration::from_millis(250),
            resize_debounce: Duration::from_millis(250),
            fast_scroll_threshold: 50.0,
            edge_epsilon: 1.0,
        }
    }
}

/// Handle identifying a registered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u64);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "region-{}", self.0)
    }
}

/// Notification that a region's visible set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityChanged {
    pub region: RegionId,
    pub visible: VisibilitySet,
}

/// What a scroll sample led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// The visible set was recomputed; `changed` tells if it differed.
    Recomputed { changed: bool },
    /// Inside the throttle window; the trailing pass will catch up.
    Throttled,
    /// Jump too large away from an edge; the trailing pass will catch up.
    SkippedFastScroll,
    /// The region is not registered.
    UnknownRegion,
}

/// Returns the keys whose span intersects the padded viewport.
#[must_use]
pub fn compute_visible_keys(
    viewport: &Viewport,
    padding: f64,
    items: &[(ViewportKey, Span)],
) -> VisibilitySet {
    let window = viewport.padded_window(padding);
    items
        .iter()
        .filter(|(_, span)| span.intersects(&window))
        .map(|(key, _)| *key)
        .collect()
}

struct RegionState {
    provider: Arc<dyn BoundsProvider>,
    visible: VisibilitySet,
    last_sampled_offset: Option<f64>,
    last_computed_at: Option<Instant>,
    trailing_deadline: Option<Instant>,
}

struct TrackerState {
    regions: HashMap<RegionId, RegionState>,
    next_id: u64,
}

impl TrackerState {
    /// Recomputes `region`, returning the new set if it changed.
    fn recompute(
        &mut self,
        region: RegionId,
        now: Instant,
        padding: f64,
    ) -> Option<Option<VisibilitySet>> {
        let state = self.regions.get_mut(&region)?;
        let viewport = state.provider.viewport();
        let visible = compute_visible_keys(&viewport, padding, &state.provider.items());

        state.last_sampled_offset = Some(viewport.offset);
        state.last_computed_at = Some(now);

        if visible == state.visible {
            trace!(region = %region, "Visible set unchanged");
            return Some(None);
        }
        debug!(region = %region, visible = visible.len(), "Visible set changed");
        state.visible = visible.clone();
        Some(Some(visible))
    }
}

/// Tracks which items of each registered region are in the viewport.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone)]
pub struct VisibilityTracker {
    state: Arc<Mutex<TrackerState>>,
    changes: Arc<Signal<VisibilityChanged>>,
    config: Arc<VisibilityConfig>,
}

impl std::fmt::Debug for VisibilityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityTracker")
            .field("regions", &self.state.lock().regions.len())
            .field("config", &self.config)
            .finish()
    }
}

impl VisibilityTracker {
    /// Creates a tracker with no regions.
    #[must_use]
    pub fn new(config: VisibilityConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                regions: HashMap::new(),
                next_id: 0,
            })),
            changes: Arc::new(Signal::new()),
            config: Arc::new(config),
        }
    }

    /// Subscribes to visible-set changes of every region.
    pub fn subscribe(&self) -> Subscription<VisibilityChanged> {
        self.changes.subscribe()
    }

    /// Starts observing a region. Dropping the registration stops it.
    #[must_use = "dropping the registration unregisters the region"]
    pub fn register_region(&self, provider: Arc<dyn BoundsProvider>) -> RegionRegistration {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = RegionId(state.next_id);
        state.regions.insert(
            id,
            RegionState {
                provider,
                visible: VisibilitySet::new(),
                last_sampled_offset: None,
                last_computed_at: None,
                trailing_deadline: None,
            },
        );
        debug!(region = %id, "Region registered");
        RegionRegistration {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Recomputes a region immediately, bypassing rate limits.
    ///
    /// Returns the current visible set, or `None` for an unknown region.
    pub fn compute_visible(&self, region: RegionId, now: Instant) -> Option<VisibilitySet> {
        let changed = self.state.lock().recompute(region, now, self.config.padding)?;
        self.publish(region, changed);
        self.visible(region)
    }

    /// Handles a scroll event on `region`.
    pub fn on_scroll(&self, region: RegionId, now: Instant) -> ScrollOutcome {
        let changed = {
            let mut state = self.state.lock();
            let Some(region_state) = state.regions.get_mut(&region) else {
                return ScrollOutcome::UnknownRegion;
            };

            region_state.trailing_deadline = Some(now + self.config.scroll_debounce);

            let viewport = region_state.provider.viewport();
            let delta = region_state
                .last_sampled_offset
                .map_or(0.0, |last| (viewport.offset - last).abs());
            region_state.last_sampled_offset = Some(viewport.offset);

            if delta > self.config.fast_scroll_threshold
                && !viewport.is_at_edge(self.config.edge_epsilon)
            {
                trace!(region = %region, delta, "Skipping fast scroll sample");
                return ScrollOutcome::SkippedFastScroll;
            }

            if region_state
                .last_computed_at
                .is_some_and(|last| now.saturating_duration_since(last) < self.config.scroll_throttle)
            {
                return ScrollOutcome::Throttled;
            }

            state
                .recompute(region, now, self.config.padding)
                .flatten()
        };

        let outcome = ScrollOutcome::Recomputed {
            changed: changed.is_some(),
        };
        self.publish(region, changed);
        outcome
    }

    /// Handles a resize of `region`; recomputation follows after the debounce.
    pub fn on_resize(&self, region: RegionId, now: Instant) {
        if let Some(region_state) = self.state.lock().regions.get_mut(&region) {
            region_state.trailing_deadline = Some(now + self.config.resize_debounce);
        }
    }

    /// Runs every trailing recomputation due at `now`.
    ///
    /// Returns the number of regions recomputed.
    pub fn poll(&self, now: Instant) -> usize {
        let changes: Vec<(RegionId, Option<VisibilitySet>)> = {
            let mut state = self.state.lock();
            let due: Vec<RegionId> = state
                .regions
                .iter_mut()
                .filter(|(_, r)| r.trailing_deadline.is_some_and(|d| d <= now))
                .map(|(id, r)| {
                    r.trailing_deadline = None;
                    *id
                })
                .collect();
            due.into_iter()
                .filter_map(|id| {
                    state
                        .recompute(id, now, self.config.padding)
                        .map(|changed| (id, changed))
                })
                .collect()
        };

        let count = changes.len();
        for (region, changed) in changes {
            self.publish(region, changed);
        }
        count
    }

    /// Earliest pending trailing recomputation, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .regions
            .values()
            .filter_map(|r| r.trailing_deadline)
            .min()
    }

    /// Last computed visible set of `region`.
    #[must_use]
    pub fn visible(&self, region: RegionId) -> Option<VisibilitySet> {
        self.state
            .lock()
            .regions
            .get(&region)
            .map(|r| r.visible.clone())
    }

    /// Returns true if `key` was visible in `region` at the last recompute.
    #[must_use]
    pub fn is_visible(&self, region: RegionId, key: &ViewportKey) -> bool {
        self.state
            .lock()
            .regions
            .get(&region)
            .is_some_and(|r| r.visible.contains(key))
    }

    /// Number of registered regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.state.lock().regions.len()
    }

    fn publish(&self, region: RegionId, changed: Option<VisibilitySet>) {
        if let Some(visible) = changed {
            self.changes.emit(VisibilityChanged { region, visible });
        }
    }
}

/// Registration guard for a region; unregisters on drop.
#[derive(Debug)]
pub struct RegionRegistration {
    id: RegionId,
    state: Weak<Mutex<TrackerState>>,
}

impl RegionRegistration {
    /// The registered region's id.
    #[must_use]
    pub const fn id(&self) -> RegionId {
        self.id
    }
}

impl Drop for RegionRegistration {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().regions.remove(&self.id);
            debug!(region = %self.id, "Region unregistered");
        }
    }
}
