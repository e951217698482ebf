//! In-process simulated host for CI testing and headless capture runs.
//!
//! [`SimArmature`] and [`SimObject`] are stub scene entities that record
//! every pose write and keyframe.  They are cheap-clone handles over shared
//! state, so a test can keep one clone for inspection while another is
//! registered in a [`SceneRegistry`][crate::registry::SceneRegistry].
//! [`SimTimerHost`] stands in for the host's timer facility and fires due
//! callbacks when pumped.
//!
//! # Example
//!
//! ```rust
//! use mocap_host::registry::SceneRegistry;
//! use mocap_host::scene::JointContainer;
//! use mocap_host::sim::SimArmature;
//! use mocap_types::JointMapping;
//!
//! let rig = SimArmature::new("Armature", ["head", "spine"])
//!     .with_mapping(JointMapping::new("imu_head", "head"));
//!
//! let mut scene = SceneRegistry::new();
//! scene.register_joint_container(Box::new(rig.clone()));
//! assert_eq!(rig.joint_mappings().len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use mocap_types::{EulerXyz, JointMapping, MocapError, ObjectMapping, TickOutcome, Vec3};
use tracing::debug;

use crate::scene::{JointContainer, PositionTarget, SceneGraph};
use crate::timer::{TickCallback, TimerHandle, TimerHost};

// ────────────────────────────────────────────────────────────────────────────
// Simulated armature
// ────────────────────────────────────────────────────────────────────────────

/// A rotation keyframe recorded by a [`SimArmature`].
#[derive(Debug, Clone, PartialEq)]
pub struct JointKeyframe {
    pub joint: String,
    pub frame: i64,
    pub rotation: EulerXyz,
}

#[derive(Default)]
struct ArmatureState {
    joints: HashMap<String, EulerXyz>,
    keyframes: Vec<JointKeyframe>,
}

/// A simulated armature with a fixed set of joints, all at rest rotation.
#[derive(Clone)]
pub struct SimArmature {
    id: String,
    mappings: Vec<JointMapping>,
    state: Arc<Mutex<ArmatureState>>,
}

impl SimArmature {
    pub fn new<I, S>(id: impl Into<String>, joints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joints = joints
            .into_iter()
            .map(|j| (j.into(), EulerXyz::default()))
            .collect();
        Self {
            id: id.into(),
            mappings: Vec::new(),
            state: Arc::new(Mutex::new(ArmatureState {
                joints,
                keyframes: Vec::new(),
            })),
        }
    }

    /// Append a joint mapping (builder style).
    pub fn with_mapping(mut self, mapping: JointMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Every rotation keyframe recorded so far, oldest first.
    pub fn keyframes(&self) -> Vec<JointKeyframe> {
        self.lock().keyframes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ArmatureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unknown(&self, joint: &str) -> MocapError {
        MocapError::UnknownTarget {
            owner: self.id.clone(),
            target: joint.to_string(),
        }
    }
}

impl JointContainer for SimArmature {
    fn id(&self) -> &str {
        &self.id
    }

    fn joint_mappings(&self) -> &[JointMapping] {
        &self.mappings
    }

    fn joint_rotation(&self, joint: &str) -> Option<EulerXyz> {
        self.lock().joints.get(joint).copied()
    }

    fn set_joint_rotation(&mut self, joint: &str, rotation: EulerXyz) -> Result<(), MocapError> {
        match self.lock().joints.get_mut(joint) {
            Some(slot) => {
                *slot = rotation;
                Ok(())
            }
            None => Err(self.unknown(joint)),
        }
    }

    fn insert_rotation_keyframe(&mut self, joint: &str, frame: i64) -> Result<(), MocapError> {
        let mut state = self.lock();
        let Some(rotation) = state.joints.get(joint).copied() else {
            return Err(self.unknown(joint));
        };
        state.keyframes.push(JointKeyframe {
            joint: joint.to_string(),
            frame,
            rotation,
        });
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated object
// ────────────────────────────────────────────────────────────────────────────

/// A position keyframe recorded by a [`SimObject`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionKeyframe {
    pub frame: i64,
    pub position: Vec3,
}

#[derive(Default)]
struct ObjectState {
    position: Vec3,
    keyframes: Vec<PositionKeyframe>,
}

/// A simulated positionable object starting at the origin.
#[derive(Clone)]
pub struct SimObject {
    id: String,
    mappings: Vec<ObjectMapping>,
    state: Arc<Mutex<ObjectState>>,
}

impl SimObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mappings: Vec::new(),
            state: Arc::new(Mutex::new(ObjectState::default())),
        }
    }

    /// Drive this object's position from `channel` (builder style).
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        let mapping = ObjectMapping::new(channel, self.id.clone());
        self.mappings.push(mapping);
        self
    }

    /// Every position keyframe recorded so far, oldest first.
    pub fn keyframes(&self) -> Vec<PositionKeyframe> {
        self.lock().keyframes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ObjectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PositionTarget for SimObject {
    fn id(&self) -> &str {
        &self.id
    }

    fn object_mappings(&self) -> &[ObjectMapping] {
        &self.mappings
    }

    fn world_position(&self) -> Vec3 {
        self.lock().position
    }

    fn set_world_position(&mut self, position: Vec3) {
        self.lock().position = position;
    }

    fn insert_position_keyframe(&mut self, frame: i64) {
        let mut state = self.lock();
        let position = state.position;
        state.keyframes.push(PositionKeyframe { frame, position });
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated timer host
// ────────────────────────────────────────────────────────────────────────────

struct SimTimer {
    handle: TimerHandle,
    due: Instant,
    callback: TickCallback,
}

/// A manually pumped [`TimerHost`].
///
/// Nothing runs on its own: call [`SimTimerHost::run_due`] from the host
/// loop (or a test) to fire every callback whose deadline has passed.
#[derive(Default)]
pub struct SimTimerHost {
    next_handle: u64,
    timers: Vec<SimTimer>,
}

impl SimTimerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every callback due at or before `now`, in registration order.
    ///
    /// A callback returning [`TickOutcome::Continue`] is rescheduled relative
    /// to `now`; one returning [`TickOutcome::Stop`] is deregistered.
    /// Returns the number of callbacks fired.
    pub fn run_due(&mut self, now: Instant, scene: &mut dyn SceneGraph) -> usize {
        let mut fired = 0;
        self.timers.retain_mut(|timer| {
            if timer.due > now {
                return true;
            }
            fired += 1;
            match (timer.callback)(scene) {
                TickOutcome::Continue(delay) => {
                    timer.due = now + delay;
                    true
                }
                TickOutcome::Stop => {
                    debug!(handle = timer.handle.0, "timer callback requested stop");
                    false
                }
            }
        });
        fired
    }

    /// Earliest pending deadline, if any timer is registered.
    pub fn next_due(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.due).min()
    }

    pub fn is_registered(&self, handle: TimerHandle) -> bool {
        self.timers.iter().any(|t| t.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl TimerHost for SimTimerHost {
    fn register(
        &mut self,
        callback: TickCallback,
        first_interval: std::time::Duration,
    ) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.timers.push(SimTimer {
            handle,
            due: Instant::now() + first_interval,
            callback,
        });
        handle
    }

    fn unregister(&mut self, handle: TimerHandle) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.handle != handle);
        before != self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SceneRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn armature_set_and_get_rotation() {
        let mut rig = SimArmature::new("rig", ["head"]);
        let rot = EulerXyz::new(0.1, 0.2, 0.3);
        rig.set_joint_rotation("head", rot).unwrap();
        assert_eq!(rig.joint_rotation("head"), Some(rot));
    }

    #[test]
    fn armature_unknown_joint_is_error() {
        let mut rig = SimArmature::new("rig", ["head"]);
        let result = rig.set_joint_rotation("tail", EulerXyz::default());
        assert!(matches!(result, Err(MocapError::UnknownTarget { .. })));
        assert!(rig.insert_rotation_keyframe("tail", 1).is_err());
        assert!(rig.joint_rotation("tail").is_none());
    }

    #[test]
    fn armature_keyframe_captures_current_rotation() {
        let mut rig = SimArmature::new("rig", ["head"]);
        let inspect = rig.clone();
        rig.set_joint_rotation("head", EulerXyz::new(1.0, 0.0, 0.0)).unwrap();
        rig.insert_rotation_keyframe("head", 7).unwrap();

        let keys = inspect.keyframes();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].frame, 7);
        assert_eq!(keys[0].rotation, EulerXyz::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn object_position_and_keyframe() {
        let mut marker = SimObject::new("marker").with_channel("m1");
        assert_eq!(marker.object_mappings()[0].object, "marker");

        marker.set_world_position(Vec3::new(1.5, -2.0, 0.0));
        marker.insert_position_keyframe(3);
        assert_eq!(
            marker.keyframes(),
            vec![PositionKeyframe {
                frame: 3,
                position: Vec3::new(1.5, -2.0, 0.0)
            }]
        );
    }

    #[test]
    fn timer_fires_only_when_due() {
        let mut timers = SimTimerHost::new();
        let mut scene = SceneRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        timers.register(
            Box::new(move |_scene| {
                c.fetch_add(1, Ordering::SeqCst);
                TickOutcome::Continue(Duration::from_millis(50))
            }),
            Duration::from_secs(60),
        );

        assert_eq!(timers.run_due(Instant::now(), &mut scene), 0);
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(timers.run_due(later, &mut scene), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Rescheduled 50 ms after `later`.
        assert_eq!(timers.next_due(), Some(later + Duration::from_millis(50)));
    }

    #[test]
    fn timer_stop_outcome_deregisters() {
        let mut timers = SimTimerHost::new();
        let mut scene = SceneRegistry::new();
        let handle = timers.register(Box::new(|_scene| TickOutcome::Stop), Duration::ZERO);

        assert!(timers.is_registered(handle));
        timers.run_due(Instant::now() + Duration::from_millis(1), &mut scene);
        assert!(!timers.is_registered(handle));
        assert!(timers.is_empty());
    }

    #[test]
    fn timer_callback_can_mutate_scene() {
        let mut timers = SimTimerHost::new();
        let mut scene = SceneRegistry::new();
        timers.register(
            Box::new(|scene| {
                scene.set_current_frame(scene.current_frame() + 1);
                TickOutcome::Continue(Duration::ZERO)
            }),
            Duration::ZERO,
        );
        let now = Instant::now() + Duration::from_millis(1);
        timers.run_due(now, &mut scene);
        timers.run_due(now, &mut scene);
        assert_eq!(scene.current_frame(), 2);
    }

    #[test]
    fn unregister_twice_reports_false() {
        let mut timers = SimTimerHost::new();
        let handle = timers.register(
            Box::new(|_scene| TickOutcome::Continue(Duration::from_millis(50))),
            Duration::from_millis(50),
        );
        assert!(timers.unregister(handle));
        assert!(!timers.unregister(handle));
        assert_eq!(timers.len(), 0);
    }
}
