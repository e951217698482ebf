//! Builds a simulated scene from a [`RigConfig`].

use mocap_host::SceneRegistry;
use mocap_host::sim::{SimArmature, SimObject};
use tracing::warn;

use crate::config::RigConfig;

/// Inspection handles for every entity registered in the scene.
pub struct SimRig {
    pub armatures: Vec<SimArmature>,
    pub objects: Vec<SimObject>,
}

impl SimRig {
    /// Total keyframes recorded across the rig.
    pub fn keyframe_count(&self) -> usize {
        let joints: usize = self.armatures.iter().map(|a| a.keyframes().len()).sum();
        let objects: usize = self.objects.iter().map(|o| o.keyframes().len()).sum();
        joints + objects
    }
}

/// Register one simulated entity per rig entry, starting the scene at
/// `start_frame`.
pub fn build_scene(rig: &RigConfig, start_frame: i64) -> (SceneRegistry, SimRig) {
    let mut scene = SceneRegistry::at_frame(start_frame);
    let mut handles = SimRig {
        armatures: Vec::with_capacity(rig.armatures.len()),
        objects: Vec::with_capacity(rig.objects.len()),
    };

    for cfg in &rig.armatures {
        let mut armature = SimArmature::new(cfg.name.clone(), cfg.joints.iter().cloned());
        for mapping in &cfg.mappings {
            if !cfg.joints.contains(&mapping.joint) {
                warn!(
                    armature = %cfg.name,
                    joint = %mapping.joint,
                    "mapping targets unknown joint; it will be skipped"
                );
            }
            armature = armature.with_mapping(mapping.clone());
        }
        scene.register_joint_container(Box::new(armature.clone()));
        handles.armatures.push(armature);
    }

    for cfg in &rig.objects {
        let object = cfg
            .channels
            .iter()
            .fold(SimObject::new(cfg.name.clone()), |obj, ch| obj.with_channel(ch.clone()));
        scene.register_position_target(Box::new(object.clone()));
        handles.objects.push(object);
    }

    (scene, handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArmatureConfig, ObjectConfig};
    use mocap_host::{JointContainer, PositionTarget, SceneGraph};
    use mocap_types::JointMapping;

    #[test]
    fn demo_rig_registers_every_entity() {
        let (scene, rig) = build_scene(&RigConfig::demo(), 10);
        assert_eq!(scene.current_frame(), 10);
        assert_eq!(scene.joint_container_count(), 1);
        assert_eq!(scene.position_target_count(), 1);
        assert_eq!(rig.armatures[0].joint_mappings().len(), 1);
        assert_eq!(rig.objects[0].object_mappings()[0].channel, "marker1");
        assert_eq!(rig.keyframe_count(), 0);
    }

    #[test]
    fn object_with_several_channels() {
        let cfg = RigConfig {
            armatures: vec![],
            objects: vec![ObjectConfig {
                name: "prop".to_string(),
                channels: vec!["a".to_string(), "b".to_string()],
            }],
        };
        let (_scene, rig) = build_scene(&cfg, 0);
        let channels: Vec<_> = rig.objects[0]
            .object_mappings()
            .iter()
            .map(|m| m.channel.as_str())
            .collect();
        assert_eq!(channels, ["a", "b"]);
    }

    #[test]
    fn unknown_joint_mapping_is_still_registered() {
        let cfg = RigConfig {
            armatures: vec![ArmatureConfig {
                name: "Rig".to_string(),
                joints: vec!["head".to_string()],
                mappings: vec![JointMapping::new("tail_imu", "tail")],
            }],
            objects: vec![],
        };
        let (scene, rig) = build_scene(&cfg, 0);
        assert_eq!(scene.joint_container_count(), 1);
        assert_eq!(rig.armatures[0].joint_mappings().len(), 1);
        assert!(rig.armatures[0].joint_rotation("tail").is_none());
    }
}
