//! Port for imperatively driving a rendered media element.

/// A `<video>`/`<audio>`/animated-sticker player bound to one component.
///
/// Calls are idempotent: playing a playing element is harmless.
pub trait MediaElement: Send + Sync {
    /// Starts or resumes playback.
    fn play(&self);

    /// Pauses playback, keeping position.
    fn pause(&self);

    /// Seeks back to the first frame.
    fn reset(&self);

    /// Drops decoded content to free resources.
    fn unload(&self);
}
