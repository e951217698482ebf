//! Host periodic-callback facility.
//!
//! Animation hosts drive repeating work from their own event loop: a
//! callback is registered with a first delay, and every time it runs it
//! returns a [`TickOutcome`] telling the host whether (and when) to run it
//! again.  The capture runtime registers its sample tick through
//! [`TimerHost`] and never runs a clock thread of its own.

use std::time::Duration;

use mocap_types::TickOutcome;

use crate::scene::SceneGraph;

/// A repeating callback invoked on the host's main thread with the scene.
pub type TickCallback = Box<dyn FnMut(&mut dyn SceneGraph) -> TickOutcome + Send>;

/// Opaque registration handle returned by [`TimerHost::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Registration API for host-driven periodic callbacks.
pub trait TimerHost {
    /// Register `callback` to run first after `first_interval`.
    fn register(&mut self, callback: TickCallback, first_interval: Duration) -> TimerHandle;

    /// Remove a registration.  Returns `false` if `handle` was not (or is no
    /// longer) registered.
    fn unregister(&mut self, handle: TimerHandle) -> bool;
}
