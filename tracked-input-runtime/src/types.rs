use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Per-tick movement command, laid out exactly like the host's native struct.
///
/// The codec only reinterprets fields that already exist here, so an unaware
/// receiver can always parse the command as an ordinary one.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
pub struct MovementCommand {
    pub sequence_number: i32,
    pub tick_signal: i32,
    /// Pitch, yaw, roll in degrees.
    pub view_angles: [f32; 3],
    pub forward_move: f32,
    pub side_move: f32,
    pub vertical_move: f32,
    pub buttons: i32,
    pub impulse: u8,
    #[serde(skip)]
    pub _pad0: [u8; 3],
    pub weapon_select: i32,
    pub weapon_subtype: i32,
    pub random_seed: i32,
    pub mouse_dx: i16,
    pub mouse_dy: i16,
    pub has_been_predicted: u8,
    #[serde(skip)]
    pub _pad1: [u8; 3],
    pub checksum: u32,
}

impl MovementCommand {
    /// CRC-32 over every checksummed field in layout order.
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.sequence_number.to_le_bytes());
        hasher.update(&self.tick_signal.to_le_bytes());
        for angle in self.view_angles {
            hasher.update(&angle.to_le_bytes());
        }
        hasher.update(&self.forward_move.to_le_bytes());
        hasher.update(&self.side_move.to_le_bytes());
        hasher.update(&self.vertical_move.to_le_bytes());
        hasher.update(&self.buttons.to_le_bytes());
        hasher.update(&[self.impulse]);
        hasher.update(&self.weapon_select.to_le_bytes());
        hasher.update(&self.weapon_subtype.to_le_bytes());
        hasher.update(&self.random_seed.to_le_bytes());
        hasher.update(&self.mouse_dx.to_le_bytes());
        hasher.update(&self.mouse_dy.to_le_bytes());
        hasher.finalize()
    }

    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    pub fn checksum_matches(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

/// Decoded tracked input state for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerSlot {
    pub is_using_tracked_input: bool,
    pub is_swinging: bool,
    /// True on exactly one tick per contiguous swing.
    pub is_swing_start: bool,
    pub controller_position: Vec3,
    /// Pitch, yaw, roll in degrees.
    pub controller_orientation: Vec3,
    pub previous_controller_orientation: Vec3,
}

impl PeerSlot {
    /// Records a swing state for this tick and derives the start edge.
    pub fn update_swing(&mut self, swinging: bool) {
        self.is_swing_start = swinging && !self.is_swinging;
        self.is_swinging = swinging;
    }

    /// Shifts the current orientation into the previous slot before writing the new one.
    pub fn push_orientation(&mut self, orientation: Vec3) {
        self.previous_controller_orientation = self.controller_orientation;
        self.controller_orientation = orientation;
    }
}

/// Mirror of [`PeerSlot`] handed across the C boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct RawPeerSlot {
    pub controller_position: [f32; 3],
    pub controller_orientation: [f32; 3],
    pub previous_controller_orientation: [f32; 3],
    pub is_using_tracked_input: u8,
    pub is_swinging: u8,
    pub is_swing_start: u8,
    pub _pad: u8,
}

impl From<&PeerSlot> for RawPeerSlot {
    fn from(slot: &PeerSlot) -> Self {
        Self {
            controller_position: slot.controller_position.to_array(),
            controller_orientation: slot.controller_orientation.to_array(),
            previous_controller_orientation: slot.previous_controller_orientation.to_array(),
            is_using_tracked_input: slot.is_using_tracked_input as u8,
            is_swinging: slot.is_swinging as u8,
            is_swing_start: slot.is_swing_start as u8,
            _pad: 0,
        }
    }
}
