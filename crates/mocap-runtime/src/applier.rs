//! [`MappingApplier`] – writes the latest channel samples onto scene targets.
//!
//! For every joint container, each joint mapping whose channel has a sample
//! in the snapshot sets that joint's XYZ Euler rotation (degrees converted
//! to radians, pitch and roll swapped) and keyframes it.  For every position
//! target, the first object mapping with a sample sets the world position
//! verbatim and keyframes it.
//!
//! Mappings without a sample this tick are skipped, so the last applied pose
//! persists.  When several mappings on one entity drive the same joint, the
//! first registered mapping that has a sample wins and the rest are skipped.

use std::collections::HashSet;

use mocap_host::{JointContainer, PositionTarget, SceneGraph};
use mocap_middleware::ChannelSnapshot;
use mocap_types::{EulerXyz, Vec3};
use tracing::debug;

/// Per-tick counters reported by [`MappingApplier::apply`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    /// Joint rotations written and keyframed.
    pub joints: usize,
    /// Object positions written and keyframed.
    pub objects: usize,
    /// Mappings whose channel had no sample.
    pub missing_samples: usize,
    /// Mappings naming a joint the entity does not have.
    pub unknown_targets: usize,
    /// Mappings skipped because an earlier mapping drove the same target.
    pub shadowed: usize,
}

/// Stateless applier; one instance is shared by every tick of a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct MappingApplier;

impl MappingApplier {
    pub fn new() -> Self {
        Self
    }

    /// Apply `snapshot` to every mapped entity in `scene`, keyframing at
    /// `frame`.
    pub fn apply(
        &self,
        snapshot: &ChannelSnapshot,
        frame: i64,
        scene: &mut dyn SceneGraph,
    ) -> ApplyStats {
        let mut stats = ApplyStats::default();
        scene.for_each_joint_container(&mut |container| {
            apply_joints(container, snapshot, frame, &mut stats);
        });
        scene.for_each_position_target(&mut |target| {
            apply_position(target, snapshot, frame, &mut stats);
        });
        stats
    }
}

fn apply_joints(
    container: &mut dyn JointContainer,
    snapshot: &ChannelSnapshot,
    frame: i64,
    stats: &mut ApplyStats,
) {
    let updates = {
        let mut driven = HashSet::new();
        let mut updates = Vec::new();
        for mapping in container.joint_mappings() {
            let Some(sample) = snapshot.get(&mapping.channel) else {
                stats.missing_samples += 1;
                continue;
            };
            if !driven.insert(mapping.joint.as_str()) {
                debug!(
                    entity = container.id(),
                    joint = %mapping.joint,
                    channel = %mapping.channel,
                    "joint already driven this tick; skipping mapping"
                );
                stats.shadowed += 1;
                continue;
            }
            updates.push((mapping.joint.clone(), EulerXyz::from_roll_pitch_yaw_degrees(*sample)));
        }
        updates
    };

    for (joint, rotation) in updates {
        let written = container
            .set_joint_rotation(&joint, rotation)
            .and_then(|()| container.insert_rotation_keyframe(&joint, frame));
        match written {
            Ok(()) => stats.joints += 1,
            Err(e) => {
                debug!(entity = container.id(), error = %e, "skipping mapping");
                stats.unknown_targets += 1;
            }
        }
    }
}

fn apply_position(
    target: &mut dyn PositionTarget,
    snapshot: &ChannelSnapshot,
    frame: i64,
    stats: &mut ApplyStats,
) {
    let mut position = None;
    for mapping in target.object_mappings() {
        match snapshot.get(&mapping.channel) {
            None => stats.missing_samples += 1,
            Some(_) if position.is_some() => stats.shadowed += 1,
            Some(sample) => position = Some(Vec3::from(*sample)),
        }
    }

    if let Some(position) = position {
        target.set_world_position(position);
        target.insert_position_keyframe(frame);
        stats.objects += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_host::SceneRegistry;
    use mocap_host::sim::{SimArmature, SimObject};
    use mocap_types::{ChannelSample, JointMapping};
    use std::f64::consts::PI;

    fn snapshot(entries: &[(&str, [f64; 3])]) -> ChannelSnapshot {
        entries
            .iter()
            .map(|(name, v)| (name.to_string(), ChannelSample::from(*v)))
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn joint_rotation_uses_pitch_roll_yaw_order() {
        let rig =
            SimArmature::new("rig", ["jointA"]).with_mapping(JointMapping::new("head", "jointA"));
        let mut scene = SceneRegistry::new();
        scene.register_joint_container(Box::new(rig.clone()));

        let samples = snapshot(&[("head", [10.0, 20.0, 30.0])]);
        let stats = MappingApplier::new().apply(&samples, 102, &mut scene);

        assert_eq!(stats.joints, 1);
        let rot = rig.joint_rotation("jointA").unwrap();
        assert!(approx(rot.x, 20.0 * PI / 180.0));
        assert!(approx(rot.y, 10.0 * PI / 180.0));
        assert!(approx(rot.z, 30.0 * PI / 180.0));

        let keys = rig.keyframes();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].joint, "jointA");
        assert_eq!(keys[0].frame, 102);
    }

    #[test]
    fn object_position_is_copied_exactly() {
        let marker = SimObject::new("objX").with_channel("marker1");
        let mut scene = SceneRegistry::new();
        scene.register_position_target(Box::new(marker.clone()));

        let samples = snapshot(&[("marker1", [1.5, -2.0, 0.0])]);
        let stats = MappingApplier::new().apply(&samples, 5, &mut scene);

        assert_eq!(stats.objects, 1);
        assert_eq!(marker.world_position(), Vec3::new(1.5, -2.0, 0.0));
        assert_eq!(marker.keyframes()[0].frame, 5);
    }

    #[test]
    fn missing_sample_keeps_last_pose() {
        let rig = SimArmature::new("rig", ["hip", "head"])
            .with_mapping(JointMapping::new("pelvis", "hip"))
            .with_mapping(JointMapping::new("head", "head"));
        let mut scene = SceneRegistry::new();
        scene.register_joint_container(Box::new(rig.clone()));
        let applier = MappingApplier::new();

        applier.apply(&snapshot(&[("pelvis", [0.0, 90.0, 0.0])]), 1, &mut scene);
        let stats = applier.apply(&snapshot(&[("head", [0.0, 0.0, 45.0])]), 2, &mut scene);

        assert_eq!(stats.joints, 1);
        assert_eq!(stats.missing_samples, 1);
        // hip still carries the frame-1 pose.
        assert!(approx(rig.joint_rotation("hip").unwrap().x, PI / 2.0));
        let hip_keys: Vec<_> = rig.keyframes().into_iter().filter(|k| k.joint == "hip").collect();
        assert_eq!(hip_keys.len(), 1);
    }

    #[test]
    fn unknown_joint_is_skipped() {
        let rig = SimArmature::new("rig", ["head"])
            .with_mapping(JointMapping::new("tail_imu", "tail"))
            .with_mapping(JointMapping::new("head", "head"));
        let mut scene = SceneRegistry::new();
        scene.register_joint_container(Box::new(rig.clone()));

        let stats = MappingApplier::new().apply(
            &snapshot(&[("tail_imu", [1.0, 1.0, 1.0]), ("head", [1.0, 1.0, 1.0])]),
            3,
            &mut scene,
        );

        assert_eq!(stats.unknown_targets, 1);
        assert_eq!(stats.joints, 1);
        assert_eq!(rig.keyframes().len(), 1);
    }

    #[test]
    fn first_registered_mapping_wins_for_shared_joint() {
        let rig = SimArmature::new("rig", ["head"])
            .with_mapping(JointMapping::new("imu_a", "head"))
            .with_mapping(JointMapping::new("imu_b", "head"));
        let mut scene = SceneRegistry::new();
        scene.register_joint_container(Box::new(rig.clone()));
        let applier = MappingApplier::new();

        let stats = applier.apply(
            &snapshot(&[("imu_a", [0.0, 10.0, 0.0]), ("imu_b", [0.0, 80.0, 0.0])]),
            1,
            &mut scene,
        );
        assert_eq!(stats.shadowed, 1);
        assert!(approx(rig.joint_rotation("head").unwrap().x, 10f64.to_radians()));

        // With no sample for the first mapping, the second one drives the joint.
        applier.apply(&snapshot(&[("imu_b", [0.0, 80.0, 0.0])]), 2, &mut scene);
        assert!(approx(rig.joint_rotation("head").unwrap().x, 80f64.to_radians()));
    }

    #[test]
    fn one_channel_can_drive_several_joints() {
        let rig = SimArmature::new("rig", ["spine_01", "spine_02"])
            .with_mapping(JointMapping::new("torso", "spine_01"))
            .with_mapping(JointMapping::new("torso", "spine_02"));
        let mut scene = SceneRegistry::new();
        scene.register_joint_container(Box::new(rig.clone()));

        let samples = snapshot(&[("torso", [5.0, 0.0, 0.0])]);
        let stats = MappingApplier::new().apply(&samples, 1, &mut scene);
        assert_eq!(stats.joints, 2);
        assert_eq!(rig.joint_rotation("spine_01"), rig.joint_rotation("spine_02"));
    }

    #[test]
    fn entities_without_mappings_are_untouched() {
        let rig = SimArmature::new("rig", ["head"]);
        let marker = SimObject::new("marker");
        let mut scene = SceneRegistry::new();
        scene.register_joint_container(Box::new(rig.clone()));
        scene.register_position_target(Box::new(marker.clone()));

        let samples = snapshot(&[("head", [1.0, 2.0, 3.0])]);
        let stats = MappingApplier::new().apply(&samples, 1, &mut scene);
        assert_eq!(stats, ApplyStats::default());
        assert!(rig.keyframes().is_empty());
        assert!(marker.keyframes().is_empty());
    }
}
