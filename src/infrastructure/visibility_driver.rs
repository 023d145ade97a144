//! Timer loop feeding layout and pointer input into a session.
//!
//! The tracker and the playback coordinator only record deadlines; this
//! driver sleeps until the earliest one and fires it, and forwards every
//! visible-set change to [`SessionContext::on_visibility_changed`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::application::SessionContext;
use crate::application::services::{RegionId, ScrollOutcome, SubjectId};

/// Input forwarded from the platform's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverInput {
    Scrolled(RegionId),
    Resized(RegionId),
    PointerDown(SubjectId),
    PointerUp(SubjectId),
    WindowFocus(bool),
}

/// Sending side of a driver. The driver stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<DriverInput>,
}

impl DriverHandle {
    /// Queues an input; returns false if the driver has stopped.
    pub fn send(&self, input: DriverInput) -> bool {
        self.tx.send(input).is_ok()
    }

    pub fn scrolled(&self, region: RegionId) -> bool {
        self.send(DriverInput::Scrolled(region))
    }

    pub fn resized(&self, region: RegionId) -> bool {
        self.send(DriverInput::Resized(region))
    }
}

pub struct VisibilityDriver {
    session: Arc<SessionContext>,
    rx: mpsc::UnboundedReceiver<DriverInput>,
}

impl VisibilityDriver {
    #[must_use]
    pub fn new(session: Arc<SessionContext>) -> (DriverHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DriverHandle { tx }, Self { session, rx })
    }

    fn next_deadline(&self) -> Option<Instant> {
        let visibility = self.session.visibility().next_deadline();
        let hold = self.session.playback().next_hold_deadline();
        match (visibility, hold) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn apply(&self, input: DriverInput) {
        let now = Instant::now();
        match input {
            DriverInput::Scrolled(region) => {
                let outcome = self.session.visibility().on_scroll(region, now);
                if outcome == ScrollOutcome::UnknownRegion {
                    debug!(region = %region, "Scroll on unregistered region");
                }
            }
            DriverInput::Resized(region) => self.session.visibility().on_resize(region, now),
            DriverInput::PointerDown(id) => self.session.playback().mouse_down(id, now),
            DriverInput::PointerUp(id) => self.session.playback().mouse_up(id),
            DriverInput::WindowFocus(focused) => {
                self.session.playback().set_window_focused(focused);
            }
        }
    }

    /// Runs until every [`DriverHandle`] is dropped.
    pub async fn run(mut self) {
        let mut changes = self.session.visibility().subscribe();
        debug!("Visibility driver started");

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                input = self.rx.recv() => {
                    let Some(input) = input else { break };
                    trace!(?input, "Driver input");
                    self.apply(input);
                }
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let now = Instant::now();
                    let recomputed = self.session.visibility().poll(now);
                    self.session.playback().tick(now);
                    trace!(recomputed, "Deadline fired");
                }
            }

            for change in changes.drain() {
                self.session.on_visibility_changed(&change).await;
            }
        }

        debug!("Visibility driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::application::SessionConfig;
    use crate::application::services::{PlaybackContext, SubjectOptions};
    use crate::domain::entities::{MessageKey, Span, Viewport, ViewportKey};
    use crate::domain::ports::mocks::{FixedBounds, MockEngine, RecordingElement};

    fn key(id: i64) -> ViewportKey {
        ViewportKey::Message(MessageKey::new(1_i64, id))
    }

    fn session() -> Arc<SessionContext> {
        Arc::new(SessionContext::new(
            Arc::new(MockEngine::default()),
            SessionConfig::default(),
        ))
    }

    fn column() -> Vec<(ViewportKey, Span)> {
        (0..20)
            .map(|i| {
                let top = i as f64 * 50.0;
                (key(i), Span::new(top, top + 50.0))
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_scroll_settles_after_debounce() {
        let session = session();
        let bounds = Arc::new(FixedBounds::new(Viewport::new(0.0, 100.0, 1000.0), column()));
        let registration = session.register_region(bounds.clone());
        let region = registration.id();

        let (handle, driver) = VisibilityDriver::new(session.clone());
        let task = tokio::spawn(driver.run());

        handle.scrolled(region);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.visibility().is_visible(region, &key(0)));
        assert!(!session.visibility().is_visible(region, &key(3)));

        bounds.scroll_to(50.0);
        handle.scrolled(region);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!session.visibility().is_visible(region, &key(3)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(session.visibility().is_visible(region, &key(3)));

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_becomes_hold_after_delay() {
        let session = session();
        let element = Arc::new(RecordingElement::default());
        let subject = session.playback().register(
            SubjectOptions::new(key(1), PlaybackContext::PickerStrip).with_autoplay(false),
            element,
        );
        let id = subject.id();

        let (handle, driver) = VisibilityDriver::new(session.clone());
        let task = tokio::spawn(driver.run());

        handle.send(DriverInput::PointerDown(id));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!session.playback().inputs(id).unwrap().user_hold);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(session.playback().inputs(id).unwrap().user_hold);

        handle.send(DriverInput::PointerUp(id));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!session.playback().inputs(id).unwrap().user_hold);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_stops_when_handles_drop() {
        let session = session();
        let bounds = Arc::new(FixedBounds::new(Viewport::new(0.0, 100.0, 1000.0), column()));
        let region = session.register_region(bounds).id();

        let (handle, driver) = VisibilityDriver::new(session);
        let task = tokio::spawn(driver.run());
        assert!(handle.resized(region));
        drop(handle);
        task.await.unwrap();
    }
}
