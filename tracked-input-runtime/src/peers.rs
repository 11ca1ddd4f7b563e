use crate::error::{TrackedInputError, TrackedInputResult};
use crate::pose::TrackedPose;
use crate::types::PeerSlot;

/// Slot 0 is the world; players occupy 1..=64.
pub const MAX_PEERS: usize = 65;

/// Bounds-checked array index for a host peer number.
pub(crate) fn peer_index(peer: i32) -> TrackedInputResult<usize> {
    usize::try_from(peer)
        .ok()
        .filter(|&index| index < MAX_PEERS)
        .ok_or(TrackedInputError::PeerOutOfRange {
            peer,
            max: MAX_PEERS - 1,
        })
}

/// Decoded tracked input for every peer slot, allocated once.
///
/// Written only by the decoder and, for the local peer, by the local
/// prediction path. Everything else reads.
#[derive(Debug, Clone)]
pub struct PeerTrackedInputTable {
    slots: Box<[PeerSlot; MAX_PEERS]>,
}

impl Default for PeerTrackedInputTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTrackedInputTable {
    pub fn new() -> Self {
        Self {
            slots: Box::new([PeerSlot::default(); MAX_PEERS]),
        }
    }

    pub fn get(&self, peer: i32) -> TrackedInputResult<&PeerSlot> {
        Ok(&self.slots[peer_index(peer)?])
    }

    pub fn get_mut(&mut self, peer: i32) -> TrackedInputResult<&mut PeerSlot> {
        Ok(&mut self.slots[peer_index(peer)?])
    }

    /// Local prediction path: the local peer's slot comes straight from the
    /// pose source instead of a decoded command.
    pub fn set_local_pose(
        &mut self,
        peer: i32,
        pose: &TrackedPose,
        melee_speed_threshold: f32,
    ) -> TrackedInputResult<()> {
        let slot = self.get_mut(peer)?;
        if !pose.is_usable() {
            slot.is_using_tracked_input = false;
            slot.update_swing(false);
            return Ok(());
        }

        slot.is_using_tracked_input = true;
        slot.update_swing(pose.speed() > melee_speed_threshold);
        slot.controller_position = pose.position;
        slot.push_orientation(pose.orientation);
        Ok(())
    }

    /// Clears a slot when its peer disconnects.
    pub fn reset(&mut self, peer: i32) -> TrackedInputResult<()> {
        *self.get_mut(peer)? = PeerSlot::default();
        Ok(())
    }

    /// Peers currently sending tracked input.
    pub fn active(&self) -> impl Iterator<Item = (i32, &PeerSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_using_tracked_input)
            .map(|(index, slot)| (index as i32, slot))
    }
}
