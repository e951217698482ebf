//! [`SceneRegistry`] – capability registry implementing [`SceneGraph`].
//!
//! Host integrations register each mappable entity once, under the
//! capability it supports.  The registry then serves as the scene handed to
//! the sample tick: it owns the frame cursor and enumerates the registered
//! joint containers and position targets in registration order.

use tracing::debug;

use crate::scene::{JointContainer, PositionTarget, SceneGraph};

/// In-process scene built from explicitly registered capability entities.
///
/// Construct with [`SceneRegistry::new`], register entities, then pass it
/// to whatever drives the host timers.
#[derive(Default)]
pub struct SceneRegistry {
    current_frame: i64,
    joint_containers: Vec<Box<dyn JointContainer>>,
    position_targets: Vec<Box<dyn PositionTarget>>,
}

impl SceneRegistry {
    /// Create an empty registry positioned at frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry positioned at `frame`.
    pub fn at_frame(frame: i64) -> Self {
        Self {
            current_frame: frame,
            ..Self::default()
        }
    }

    /// Register an armature.  An entity already registered under the same
    /// `id` is replaced in place, keeping its position in the visit order.
    pub fn register_joint_container(&mut self, entity: Box<dyn JointContainer>) {
        debug!(
            id = entity.id(),
            mappings = entity.joint_mappings().len(),
            "register joint container"
        );
        match self.joint_containers.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => *slot = entity,
            None => self.joint_containers.push(entity),
        }
    }

    /// Register a positionable object.  An entity already registered under
    /// the same `id` is replaced in place.
    pub fn register_position_target(&mut self, entity: Box<dyn PositionTarget>) {
        debug!(
            id = entity.id(),
            mappings = entity.object_mappings().len(),
            "register position target"
        );
        match self.position_targets.iter_mut().find(|e| e.id() == entity.id()) {
            Some(slot) => *slot = entity,
            None => self.position_targets.push(entity),
        }
    }

    /// Remove the joint container registered as `id`, if any.
    pub fn remove_joint_container(&mut self, id: &str) -> bool {
        let before = self.joint_containers.len();
        self.joint_containers.retain(|e| e.id() != id);
        before != self.joint_containers.len()
    }

    /// Remove the position target registered as `id`, if any.
    pub fn remove_position_target(&mut self, id: &str) -> bool {
        let before = self.position_targets.len();
        self.position_targets.retain(|e| e.id() != id);
        before != self.position_targets.len()
    }

    pub fn joint_container(&self, id: &str) -> Option<&dyn JointContainer> {
        self.joint_containers.iter().find(|e| e.id() == id).map(|e| e.as_ref())
    }

    pub fn position_target(&self, id: &str) -> Option<&dyn PositionTarget> {
        self.position_targets.iter().find(|e| e.id() == id).map(|e| e.as_ref())
    }

    pub fn joint_container_count(&self) -> usize {
        self.joint_containers.len()
    }

    pub fn position_target_count(&self) -> usize {
        self.position_targets.len()
    }
}

impl SceneGraph for SceneRegistry {
    fn current_frame(&self) -> i64 {
        self.current_frame
    }

    fn set_current_frame(&mut self, frame: i64) {
        self.current_frame = frame;
    }

    fn for_each_joint_container(&mut self, visit: &mut dyn FnMut(&mut dyn JointContainer)) {
        for entity in &mut self.joint_containers {
            visit(entity.as_mut());
        }
    }

    fn for_each_position_target(&mut self, visit: &mut dyn FnMut(&mut dyn PositionTarget)) {
        for entity in &mut self.position_targets {
            visit(entity.as_mut());
        }
    }
}
