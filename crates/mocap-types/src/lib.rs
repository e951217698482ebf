use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Latest value received for a single channel.
///
/// The meaning of the three components is decided by whichever mapping
/// table consumes the channel: Euler degrees `(roll, pitch, yaw)` for joint
/// mappings, Cartesian `(x, y, z)` for object mappings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ChannelSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for ChannelSample {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// A world-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<ChannelSample> for Vec3 {
    fn from(s: ChannelSample) -> Self {
        Self::new(s.x, s.y, s.z)
    }
}

/// Local joint rotation in radians, applied in X-Y-Z axis order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerXyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EulerXyz {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Convert a `(roll, pitch, yaw)` sample in degrees into a joint rotation.
    ///
    /// Pitch drives the X axis and roll drives the Y axis (the first two
    /// components are swapped relative to the wire order).
    pub fn from_roll_pitch_yaw_degrees(sample: ChannelSample) -> Self {
        let (roll, pitch, yaw) = (sample.x, sample.y, sample.z);
        Self::new(pitch.to_radians(), roll.to_radians(), yaw.to_radians())
    }
}

/// Drives one joint of an armature from a named channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointMapping {
    pub channel: String,
    pub joint: String,
}

impl JointMapping {
    pub fn new(channel: impl Into<String>, joint: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            joint: joint.into(),
        }
    }
}

/// Drives the world position of the object that owns the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectMapping {
    pub channel: String,
    /// Name of the driven object; always the owner of the mapping list.
    pub object: String,
}

impl ObjectMapping {
    pub fn new(channel: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            object: object.into(),
        }
    }
}

/// What a periodic host callback asks of its timer after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Invoke the callback again after the given delay.
    Continue(Duration),
    /// Deregister the callback.
    Stop,
}

/// Successful result of a session control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Started,
    Stopped,
    /// `start` while a session is already capturing; nothing changed.
    AlreadyCapturing,
    /// `stop` while idle; nothing changed.
    AlreadyIdle,
}

impl CommandStatus {
    /// `true` when the command changed the session state.
    pub fn changed_state(self) -> bool {
        matches!(self, CommandStatus::Started | CommandStatus::Stopped)
    }
}

/// Workspace-wide error type for capture sessions and host interaction.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MocapError {
    #[error("Failed to bind UDP socket on {addr}: {details}")]
    Bind { addr: String, details: String },

    #[error("Socket configuration error: {0}")]
    Socket(String),

    #[error("Datagram listener stopped on a fatal socket error: {0}")]
    ListenerFault(String),

    #[error("Unknown target '{target}' on {owner}")]
    UnknownTarget { owner: String, target: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Thread error: {0}")]
    Thread(String),
}
