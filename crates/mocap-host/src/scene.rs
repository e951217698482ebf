//! Scene-graph capability traits implemented by the host application.
//!
//! The capture runtime never touches host entities directly.  An entity that
//! can be posed joint-by-joint implements [`JointContainer`]; an entity whose
//! world position can be driven implements [`PositionTarget`].  The host
//! exposes both kinds through [`SceneGraph`], deciding the capability once
//! when the entity is registered rather than probing it every tick.

use mocap_types::{EulerXyz, JointMapping, MocapError, ObjectMapping, Vec3};

/// A skeletal entity (armature) whose joints can be posed and keyframed.
pub trait JointContainer: Send {
    /// Stable identifier for this entity, e.g. `"Armature"`.
    fn id(&self) -> &str;

    /// Mappings in registration order.
    fn joint_mappings(&self) -> &[JointMapping];

    /// Current local rotation of `joint`, or `None` if there is no such joint.
    fn joint_rotation(&self, joint: &str) -> Option<EulerXyz>;

    /// Set the local rotation of `joint`.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::UnknownTarget`] if the entity has no such joint.
    fn set_joint_rotation(&mut self, joint: &str, rotation: EulerXyz) -> Result<(), MocapError>;

    /// Record a keyframe for the rotation channel of `joint` at `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::UnknownTarget`] if the entity has no such joint.
    fn insert_rotation_keyframe(&mut self, joint: &str, frame: i64) -> Result<(), MocapError>;
}

/// An entity whose world-space position can be driven and keyframed.
pub trait PositionTarget: Send {
    /// Stable identifier for this entity, e.g. `"Marker.001"`.
    fn id(&self) -> &str;

    /// Mappings in registration order.
    fn object_mappings(&self) -> &[ObjectMapping];

    fn world_position(&self) -> Vec3;

    fn set_world_position(&mut self, position: Vec3);

    /// Record a keyframe for the position channel at `frame`.
    fn insert_position_keyframe(&mut self, frame: i64);
}

/// The host's scene: a frame cursor plus the registered capability entities.
pub trait SceneGraph {
    fn current_frame(&self) -> i64;

    fn set_current_frame(&mut self, frame: i64);

    /// Visit every entity registered with the joint-container capability.
    fn for_each_joint_container(&mut self, visit: &mut dyn FnMut(&mut dyn JointContainer));

    /// Visit every entity registered with the position-target capability.
    fn for_each_position_target(&mut self, visit: &mut dyn FnMut(&mut dyn PositionTarget));
}
