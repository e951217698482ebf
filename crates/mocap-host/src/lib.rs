//! `mocap-host` – Host application interface
//!
//! The capture runtime drives an animation host it does not own.  This crate
//! describes that host as a small set of traits and ships an in-process
//! simulation of it.
//!
//! # Modules
//!
//! - [`scene`] – [`SceneGraph`][scene::SceneGraph] plus the two entity
//!   capabilities, [`JointContainer`][scene::JointContainer] and
//!   [`PositionTarget`][scene::PositionTarget].
//! - [`timer`] – [`TimerHost`][timer::TimerHost]: the host's repeating
//!   callback registration API.
//! - [`registry`] – [`SceneRegistry`][registry::SceneRegistry]: a scene built
//!   from entities registered once under their capability.
//! - [`sim`] – simulated armatures, objects and a manually pumped timer host
//!   for tests and headless runs.

pub mod registry;
pub mod scene;
pub mod sim;
pub mod timer;

pub use registry::SceneRegistry;
pub use scene::{JointContainer, PositionTarget, SceneGraph};
pub use timer::{TickCallback, TimerHandle, TimerHost};
