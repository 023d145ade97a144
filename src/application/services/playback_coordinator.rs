//! Play/pause decisions for mounted media players.
//!
//! Every input change re-evaluates the affected subjects and drives their
//! [`MediaElement`] only when the decision flips. Element calls are made
//! after the internal lock is released.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::entities::ViewportKey;
use crate::domain::ports::MediaElement;

use super::visibility_tracker::{RegionId, VisibilityChanged};

/// Modal surfaces whose open state suppresses background playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Overlay {
    MediaViewer,
    ProfileViewer,
    InstantView,
    StickerSetDialog,
    ChatPopup,
}

/// Where a player is mounted; decides which blockers apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackContext {
    /// A bubble in the message list. Every open overlay blocks it.
    #[default]
    MessageList,
    /// A picker or hint strip. Blocked by the sticker-set dialog and by
    /// another item's held preview.
    PickerStrip,
}

/// Reason a subject may not play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Blocker {
    Overlay(Overlay),
    PreviewOfAnother,
}

/// Snapshot of everything that decides whether a subject plays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackInputs {
    pub window_focused: bool,
    pub viewport_visible: bool,
    pub blockers: BTreeSet<Blocker>,
    pub autoplay: bool,
    pub user_hold: bool,
}

impl PlaybackInputs {
    #[must_use]
    pub fn should_play(&self) -> bool {
        self.window_focused
            && self.viewport_visible
            && self.blockers.is_empty()
            && (self.autoplay || self.user_hold)
    }
}

/// Timing for hold and hover previews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// How long the pointer must stay down before a preview starts.
    pub hold_delay: Duration,
    /// Loops a hover-activated item may finish after the pointer leaves.
    pub preview_loops: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            hold_delay: Duration::from_millis(500),
            preview_loops: 1,
        }
    }
}

/// Registration parameters for a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectOptions {
    pub key: ViewportKey,
    /// Region whose visibility changes drive this subject.
    pub region: Option<RegionId>,
    pub context: PlaybackContext,
    pub autoplay: bool,
}

impl SubjectOptions {
    #[must_use]
    pub const fn new(key: ViewportKey, context: PlaybackContext) -> Self {
        Self {
            key,
            region: None,
            context,
            autoplay: true,
        }
    }

    #[must_use]
    pub const fn in_region(mut self, region: RegionId) -> Self {
        self.region = Some(region);
        self
    }

    #[must_use]
    pub const fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }
}

/// Identifies one registered player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Pause,
    Reset,
    Unload,
}

type Dispatch = Vec<(Arc<dyn MediaElement>, Command)>;

fn dispatch(calls: Dispatch) {
    for (element, command) in calls {
        match command {
            Command::Play => element.play(),
            Command::Pause => element.pause(),
            Command::Reset => element.reset(),
            Command::Unload => element.unload(),
        }
    }
}

struct Subject {
    options: SubjectOptions,
    element: Arc<dyn MediaElement>,
    viewport_visible: bool,
    pressed_at: Option<Instant>,
    held: bool,
    hovering: bool,
    loops_remaining: Option<u32>,
    playing: bool,
}

#[derive(Default)]
struct CoordinatorState {
    subjects: HashMap<SubjectId, Subject>,
    window_focused: bool,
    overlays: HashSet<Overlay>,
    held_subject: Option<SubjectId>,
    next_id: u64,
}

impl CoordinatorState {
    fn inputs(&self, id: SubjectId) -> Option<PlaybackInputs> {
        let subject = self.subjects.get(&id)?;
        let blockers: BTreeSet<Blocker> = match subject.options.context {
            PlaybackContext::MessageList => {
                self.overlays.iter().copied().map(Blocker::Overlay).collect()
            }
            PlaybackContext::PickerStrip => {
                let mut blockers = BTreeSet::new();
                if self.overlays.contains(&Overlay::StickerSetDialog) {
                    blockers.insert(Blocker::Overlay(Overlay::StickerSetDialog));
                }
                if self.held_subject.is_some_and(|held| held != id) {
                    blockers.insert(Blocker::PreviewOfAnother);
                }
                blockers
            }
        };

        Some(PlaybackInputs {
            window_focused: self.window_focused,
            viewport_visible: subject.viewport_visible,
            blockers,
            autoplay: subject.options.autoplay,
            user_hold: subject.held || subject.hovering || subject.loops_remaining.is_some(),
        })
    }

    fn evaluate(&mut self, id: SubjectId, calls: &mut Dispatch) {
        let Some(should_play) = self.inputs(id).map(|i| i.should_play()) else {
            return;
        };
        let Some(subject) = self.subjects.get_mut(&id) else {
            return;
        };
        if subject.playing == should_play {
            return;
        }
        subject.playing = should_play;
        trace!(key = %subject.options.key, should_play, "Playback decision changed");
        let command = if should_play {
            Command::Play
        } else {
            Command::Pause
        };
        calls.push((subject.element.clone(), command));
    }

    fn evaluate_all(&mut self, calls: &mut Dispatch) {
        let ids: Vec<SubjectId> = self.subjects.keys().copied().collect();
        for id in ids {
            self.evaluate(id, calls);
        }
    }
}

struct Inner {
    state: Mutex<CoordinatorState>,
    config: PlaybackConfig,
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut CoordinatorState, &mut Dispatch)) {
        let mut calls = Vec::new();
        f(&mut self.state.lock(), &mut calls);
        dispatch(calls);
    }
}

/// Decides play/pause for every registered media player.
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PlaybackCoordinator")
            .field("subjects", &state.subjects.len())
            .field("window_focused", &state.window_focused)
            .field("overlays", &state.overlays)
            .finish()
    }
}

impl PlaybackCoordinator {
    /// Creates a coordinator; the window starts focused with no overlays.
    #[must_use]
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState {
                    window_focused: true,
                    ..CoordinatorState::default()
                }),
                config,
            }),
        }
    }

    /// Registers a player. It starts outside the viewport and paused.
    #[must_use = "dropping the handle unregisters the player"]
    pub fn register(
        &self,
        options: SubjectOptions,
        element: Arc<dyn MediaElement>,
    ) -> PlaybackHandle {
        let mut state = self.inner.state.lock();
        state.next_id += 1;
        let id = SubjectId(state.next_id);
        debug!(key = %options.key, "Playback subject registered");
        state.subjects.insert(
            id,
            Subject {
                options,
                element,
                viewport_visible: false,
                pressed_at: None,
                held: false,
                hovering: false,
                loops_remaining: None,
                playing: false,
            },
        );
        PlaybackHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn set_window_focused(&self, focused: bool) {
        self.inner.update(|state, calls| {
            if state.window_focused != focused {
                state.window_focused = focused;
                state.evaluate_all(calls);
            }
        });
    }

    pub fn set_overlay(&self, overlay: Overlay, open: bool) {
        self.inner.update(|state, calls| {
            let changed = if open {
                state.overlays.insert(overlay)
            } else {
                state.overlays.remove(&overlay)
            };
            if changed {
                debug!(?overlay, open, "Overlay toggled");
                state.evaluate_all(calls);
            }
        });
    }

    /// Applies a region's new visible set to the subjects mounted in it.
    pub fn apply_visibility(&self, change: &VisibilityChanged) {
        self.inner.update(|state, calls| {
            let affected: Vec<SubjectId> = state
                .subjects
                .iter_mut()
                .filter(|(_, s)| s.options.region == Some(change.region))
                .map(|(id, s)| {
                    s.viewport_visible = change.visible.contains(&s.options.key);
                    *id
                })
                .collect();
            for id in affected {
                state.evaluate(id, calls);
            }
        });
    }

    pub fn set_viewport_visible(&self, id: SubjectId, visible: bool) {
        self.inner.update(|state, calls| {
            if let Some(subject) = state.subjects.get_mut(&id) {
                subject.viewport_visible = visible;
                state.evaluate(id, calls);
            }
        });
    }

    /// Pointer pressed on a subject; a preview starts once [`Self::tick`]
    /// sees it held past the hold delay.
    pub fn mouse_down(&self, id: SubjectId, now: Instant) {
        if let Some(subject) = self.inner.state.lock().subjects.get_mut(&id) {
            subject.pressed_at = Some(now);
        }
    }

    /// Promotes presses older than the hold delay to held previews.
    pub fn tick(&self, now: Instant) {
        let hold_delay = self.inner.config.hold_delay;
        self.inner.update(|state, calls| {
            let ready: Vec<(SubjectId, Instant)> = state
                .subjects
                .iter_mut()
                .filter_map(|(id, s)| {
                    let at = s.pressed_at.filter(|_| !s.held)?;
                    (now.saturating_duration_since(at) >= hold_delay).then(|| {
                        s.held = true;
                        (*id, at)
                    })
                })
                .collect();
            if let Some((latest, _)) = ready.iter().max_by_key(|(_, at)| *at) {
                debug!(count = ready.len(), "Preview hold started");
                state.held_subject = Some(*latest);
                state.evaluate_all(calls);
            }
        });
    }

    /// When the pending press will turn into a held preview.
    #[must_use]
    pub fn next_hold_deadline(&self) -> Option<Instant> {
        let hold_delay = self.inner.config.hold_delay;
        self.inner
            .state
            .lock()
            .subjects
            .values()
            .filter(|s| !s.held)
            .filter_map(|s| s.pressed_at.map(|at| at + hold_delay))
            .min()
    }

    /// Pointer released; a held preview stops and rewinds.
    pub fn mouse_up(&self, id: SubjectId) {
        self.inner.update(|state, calls| {
            let Some(subject) = state.subjects.get_mut(&id) else {
                return;
            };
            subject.pressed_at = None;
            if !subject.held {
                return;
            }
            subject.held = false;
            subject.playing = false;
            calls.push((subject.element.clone(), Command::Pause));
            calls.push((subject.element.clone(), Command::Reset));
            if state.held_subject == Some(id) {
                state.held_subject = None;
            }
            state.evaluate_all(calls);
        });
    }

    pub fn mouse_enter(&self, id: SubjectId) {
        self.inner.update(|state, calls| {
            if let Some(subject) = state.subjects.get_mut(&id) {
                subject.hovering = true;
                subject.loops_remaining = None;
                state.evaluate(id, calls);
            }
        });
    }

    /// Pointer left; a hover-started preview may finish its loops first.
    pub fn mouse_leave(&self, id: SubjectId) {
        let preview_loops = self.inner.config.preview_loops;
        self.inner.update(|state, calls| {
            if let Some(subject) = state.subjects.get_mut(&id) {
                subject.hovering = false;
                if !subject.options.autoplay && subject.playing && preview_loops > 0 {
                    subject.loops_remaining = Some(preview_loops);
                }
                state.evaluate(id, calls);
            }
        });
    }

    /// The player finished one loop. Returns true if it was unloaded.
    pub fn loop_completed(&self, id: SubjectId) -> bool {
        let mut unloaded = false;
        self.inner.update(|state, calls| {
            let Some(subject) = state.subjects.get_mut(&id) else {
                return;
            };
            let Some(remaining) = subject.loops_remaining else {
                return;
            };
            if remaining > 1 {
                subject.loops_remaining = Some(remaining - 1);
                return;
            }
            subject.loops_remaining = None;
            let element = subject.element.clone();
            trace!(key = %subject.options.key, "Hover preview finished");
            state.evaluate(id, calls);
            calls.push((element, Command::Unload));
            unloaded = true;
        });
        unloaded
    }

    #[must_use]
    pub fn is_overlay_open(&self, overlay: Overlay) -> bool {
        self.inner.state.lock().overlays.contains(&overlay)
    }

    #[must_use]
    pub fn is_playing(&self, id: SubjectId) -> bool {
        self.inner
            .state
            .lock()
            .subjects
            .get(&id)
            .is_some_and(|s| s.playing)
    }

    /// Current decision inputs of a subject.
    #[must_use]
    pub fn inputs(&self, id: SubjectId) -> Option<PlaybackInputs> {
        self.inner.state.lock().inputs(id)
    }

    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.inner.state.lock().subjects.len()
    }

    /// Pauses whatever is playing, drops every subject and restores the
    /// initial global state.
    pub fn reset(&self) {
        self.inner.update(|state, calls| {
            calls.extend(
                state
                    .subjects
                    .values()
                    .filter(|s| s.playing)
                    .map(|s| (s.element.clone(), Command::Pause)),
            );
            *state = CoordinatorState {
                window_focused: true,
                next_id: state.next_id,
                ..CoordinatorState::default()
            };
        });
    }
}

/// Registration of one player; unregisters on drop.
pub struct PlaybackHandle {
    id: SubjectId,
    inner: Weak<Inner>,
}

impl PlaybackHandle {
    #[must_use]
    pub const fn id(&self) -> SubjectId {
        self.id
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle").field("id", &self.id).finish()
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let id = self.id;
        inner.update(|state, calls| {
            if state.subjects.remove(&id).is_some() {
                trace!("Playback subject unregistered");
            }
            if state.held_subject == Some(id) {
                state.held_subject = None;
                state.evaluate_all(calls);
            }
        });
    }
}
