//! [`SampleScheduler`] – the fixed-rate sample tick.
//!
//! The host invokes the tick roughly every [`DEFAULT_SAMPLE_INTERVAL`]
//! through its own timer facility.  Each tick:
//!
//! 1. returns [`TickOutcome::Stop`] once the session is no longer active;
//! 2. does nothing while the [`ChannelStore`] is empty;
//! 3. otherwise maps wall-clock time to a frame with [`FrameClock`], moves
//!    the scene cursor there and runs the [`MappingApplier`];
//! 4. asks to be invoked again after the sample interval.
//!
//! The frame is a function of elapsed time, not of how many ticks fired, so
//! ticks lost to host stalls are skipped rather than replayed.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use mocap_runtime::scheduler::FrameClock;
//!
//! let start = Instant::now();
//! let clock = FrameClock::new(100, start, Duration::from_millis(50));
//! assert_eq!(clock.frame_at(start + Duration::from_millis(120)), 102);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mocap_host::{SceneGraph, TickCallback};
use mocap_middleware::ChannelStore;
use mocap_types::TickOutcome;
use tracing::{debug, trace};

use crate::applier::MappingApplier;

/// Nominal tick period (20 Hz).
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// Maps wall-clock instants onto scene frames for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    base_frame: i64,
    start: Instant,
    interval: Duration,
}

impl FrameClock {
    /// `interval` must be non-zero; a zero interval pins every instant to
    /// `base_frame`.
    pub fn new(base_frame: i64, start: Instant, interval: Duration) -> Self {
        Self {
            base_frame,
            start,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `base_frame + floor((now - start) / interval)`.  Instants before
    /// `start` map to `base_frame`.
    pub fn frame_at(&self, now: Instant) -> i64 {
        if self.interval.is_zero() {
            return self.base_frame;
        }
        let elapsed = now.saturating_duration_since(self.start);
        let steps = elapsed.as_nanos() / self.interval.as_nanos();
        self.base_frame
            .saturating_add(i64::try_from(steps).unwrap_or(i64::MAX))
    }
}

/// Session-scoped tick state: the clock, the shared store and the session's
/// active flag.
pub struct SampleScheduler {
    clock: FrameClock,
    store: ChannelStore,
    active: Arc<AtomicBool>,
    applier: MappingApplier,
    last_frame: Option<i64>,
}

impl SampleScheduler {
    pub fn new(clock: FrameClock, store: ChannelStore, active: Arc<AtomicBool>) -> Self {
        Self {
            clock,
            store,
            active,
            applier: MappingApplier::new(),
            last_frame: None,
        }
    }

    /// Run one tick at the current time.
    pub fn tick(&mut self, scene: &mut dyn SceneGraph) -> TickOutcome {
        self.tick_at(Instant::now(), scene)
    }

    /// Run one tick as if the host invoked it at `now`.
    pub fn tick_at(&mut self, now: Instant, scene: &mut dyn SceneGraph) -> TickOutcome {
        if !self.active.load(Ordering::Acquire) {
            debug!("session inactive; sample tick deregistering");
            return TickOutcome::Stop;
        }

        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            trace!("no samples yet; idle tick");
            return TickOutcome::Continue(self.clock.interval());
        }

        let frame = self.clock.frame_at(now);
        scene.set_current_frame(frame);
        let stats = self.applier.apply(&snapshot, frame, scene);

        if let Some(prev) = self.last_frame
            && frame > prev + 1
        {
            debug!(from = prev, to = frame, "sample ticks skipped");
        }
        self.last_frame = Some(frame);

        trace!(
            frame,
            joints = stats.joints,
            objects = stats.objects,
            missing = stats.missing_samples,
            "sample tick applied"
        );
        TickOutcome::Continue(self.clock.interval())
    }

    /// Box this scheduler as a host timer callback.
    pub fn into_callback(mut self) -> TickCallback {
        Box::new(move |scene| self.tick(scene))
    }
}
