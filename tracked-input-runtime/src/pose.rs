use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Snapshot of one tracked device as reported by the headset SDK.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedPose {
    pub position: Vec3,
    /// Pitch, yaw, roll in degrees.
    pub orientation: Vec3,
    pub linear_velocity: Vec3,
    pub valid: bool,
}

impl TrackedPose {
    /// Stale or non-finite poses are never encoded.
    pub fn is_usable(&self) -> bool {
        self.valid
            && self.position.is_finite()
            && self.orientation.is_finite()
            && self.linear_velocity.is_finite()
    }

    pub fn speed(&self) -> f32 {
        self.linear_velocity.length()
    }
}

/// Tracked devices the pose source can report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Head,
    PrimaryController,
    SecondaryController,
}

pub trait PoseSource {
    fn pose(&self, role: DeviceRole) -> Option<TrackedPose>;
}

/// Pose layout used by the host when calling into the runtime.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct RawPose {
    pub position: [f32; 3],
    pub orientation: [f32; 3],
    pub linear_velocity: [f32; 3],
    pub valid: u8,
    pub _pad: [u8; 3],
}

impl From<RawPose> for TrackedPose {
    fn from(raw: RawPose) -> Self {
        Self {
            position: Vec3::from(raw.position),
            orientation: Vec3::from(raw.orientation),
            linear_velocity: Vec3::from(raw.linear_velocity),
            valid: raw.valid != 0,
        }
    }
}
