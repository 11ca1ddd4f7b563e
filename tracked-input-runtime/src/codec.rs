//! Encoding of tracked controller state into an unmodified movement command.
//!
//! Every field touched here already exists on the host's command struct and is
//! reinterpreted rather than extended:
//!
//! * `tick_signal` sign: payload present.
//! * `sequence_number` sign: melee swing active. Its magnitude carries the
//!   controller roll in 2 degree buckets, scaled by [`ROLL_SCALE`].
//! * `mouse_dx` / `mouse_dy`: controller pitch and yaw in tenths of a degree.
//! * `view_angles.z` / `vertical_move`: controller position x and y.
//! * `view_angles.x`: view pitch and controller position z packed into one
//!   integer, see [`JOINT_SCALE`].
//!
//! Decode reverses all of this before any other consumer sees the command, and
//! is a no-op for commands from senders that never encoded.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::pose::TrackedPose;
use crate::types::{MovementCommand, PeerSlot};

/// Multiplier applied to the roll bucket before adding it to the sequence number.
pub const ROLL_SCALE: i32 = 10_000_000;
/// Multiplier separating position z (tenths) from the pitch term in `view_angles.x`.
pub const JOINT_SCALE: i64 = 10_000;
const ANGLE_SCALE: f32 = 10.0;
const PITCH_BIAS: f64 = 360.0;
const MAX_PITCH_TERM: i64 = JOINT_SCALE - 1;
/// Clamp bound for position z in tenths of a unit (|z| <= 21474.7), the
/// largest value whose joint integer still fits in an i32.
///
/// Above 2^24 the f32 field rounds the joint value, which only disturbs the
/// low pitch digits: z is still recovered exactly, view pitch within a few
/// degrees at the bound.
pub const MAX_JOINT_Z_TENTHS: i64 = (i32::MAX as i64 - MAX_PITCH_TERM) / JOINT_SCALE;

/// What to do when position z does not fit the joint pitch/z field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointOverflowPolicy {
    /// Clamp z so the joint value stays within 32 bits.
    #[default]
    Clamp,
    /// Legacy unguarded 32-bit arithmetic, wrapping on overflow.
    Wrap,
}

/// Pre-encode copy of the reinterpreted fields.
///
/// Applied to the local command after transmission so local prediction never
/// sees the encoded values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRestore {
    original: MovementCommand,
}

impl PendingRestore {
    pub fn restore(self, cmd: &mut MovementCommand) {
        let original = self.original;
        cmd.sequence_number = original.sequence_number;
        cmd.tick_signal = original.tick_signal;
        cmd.view_angles = original.view_angles;
        cmd.vertical_move = original.vertical_move;
        cmd.mouse_dx = original.mouse_dx;
        cmd.mouse_dy = original.mouse_dy;
        cmd.refresh_checksum();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodeOutcome {
    /// Payload written. `clamped` reports that position z hit the joint bound.
    Encoded {
        restore: PendingRestore,
        swinging: bool,
        clamped: bool,
    },
    /// Command left untouched (unusable pose or unmarkable command).
    NoPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded { swing_start: bool },
    /// Foreign or legacy command, passed through unchanged.
    NoPayload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedInputCodec {
    pub melee_speed_threshold: f32,
    pub joint_overflow: JointOverflowPolicy,
}

impl Default for TrackedInputCodec {
    fn default() -> Self {
        Self {
            melee_speed_threshold: 1.1,
            joint_overflow: JointOverflowPolicy::Clamp,
        }
    }
}

impl TrackedInputCodec {
    pub fn new(melee_speed_threshold: f32, joint_overflow: JointOverflowPolicy) -> Self {
        Self {
            melee_speed_threshold,
            joint_overflow,
        }
    }

    /// Writes the controller payload into `cmd` in place.
    ///
    /// Steps run in a fixed order: the swing negation must follow the roll
    /// addend so only the sign of the combined value changes.
    pub fn encode(&self, cmd: &mut MovementCommand, pose: &TrackedPose) -> EncodeOutcome {
        if !pose.is_usable() {
            return EncodeOutcome::NoPayload;
        }
        if cmd.tick_signal <= 0 || !(0..ROLL_SCALE).contains(&cmd.sequence_number) {
            log::debug!(
                "Command {} / tick {} cannot carry a payload, sending as is",
                cmd.sequence_number,
                cmd.tick_signal
            );
            return EncodeOutcome::NoPayload;
        }

        let restore = PendingRestore { original: *cmd };

        cmd.tick_signal = -cmd.tick_signal;

        cmd.sequence_number += roll_bucket(pose.orientation.z) * ROLL_SCALE;

        let swinging = pose.speed() > self.melee_speed_threshold;
        if swinging {
            cmd.sequence_number = -cmd.sequence_number;
        }

        cmd.mouse_dx = quantize_angle(pose.orientation.x);
        cmd.mouse_dy = quantize_angle(pose.orientation.y);

        cmd.view_angles[2] = pose.position.x;
        cmd.vertical_move = pose.position.y;

        let (joint, clamped) =
            pack_pitch_and_z(cmd.view_angles[0], pose.position.z, self.joint_overflow);
        cmd.view_angles[0] = joint;

        cmd.refresh_checksum();

        EncodeOutcome::Encoded {
            restore,
            swinging,
            clamped,
        }
    }

    /// Extracts the payload into `slot` and restores `cmd` for the rest of the
    /// host pipeline.
    pub fn decode(&self, cmd: &mut MovementCommand, slot: &mut PeerSlot) -> DecodeOutcome {
        if cmd.tick_signal >= 0 {
            slot.is_using_tracked_input = false;
            slot.update_swing(false);
            return DecodeOutcome::NoPayload;
        }

        if !cmd.checksum_matches() {
            log::warn!(
                "Tracked command {} arrived with a stale checksum",
                cmd.sequence_number
            );
        }

        cmd.tick_signal = cmd.tick_signal.wrapping_neg();

        let swinging = cmd.sequence_number < 0;
        if swinging {
            cmd.sequence_number = cmd.sequence_number.wrapping_neg();
        }

        let bucket = cmd.sequence_number / ROLL_SCALE;
        cmd.sequence_number -= bucket * ROLL_SCALE;
        let roll = (bucket * 2 - 180) as f32;

        let pitch = f32::from(cmd.mouse_dx) / ANGLE_SCALE;
        let yaw = f32::from(cmd.mouse_dy) / ANGLE_SCALE;
        cmd.mouse_dx = 0;
        cmd.mouse_dy = 0;

        let position_x = cmd.view_angles[2];
        let position_y = cmd.vertical_move;
        cmd.view_angles[2] = 0.0;
        cmd.vertical_move = 0.0;

        let (view_pitch, position_z) = unpack_pitch_and_z(cmd.view_angles[0]);
        cmd.view_angles[0] = view_pitch;

        cmd.refresh_checksum();

        slot.is_using_tracked_input = true;
        slot.update_swing(swinging);
        slot.controller_position = Vec3::new(position_x, position_y, position_z);
        slot.push_orientation(Vec3::new(pitch, yaw, roll));

        DecodeOutcome::Decoded {
            swing_start: slot.is_swing_start,
        }
    }
}

/// Maps any angle into (-180, 180].
pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// 2 degree roll bucket in 1..=180. Bucket 0 (-180) aliases 180, which keeps
/// the encoded sequence number non-zero so its sign always survives.
fn roll_bucket(roll: f32) -> i32 {
    let roll = f64::from(normalize_degrees(roll));
    let bucket = ((roll + 180.0) / 2.0).round() as i32;
    if bucket == 0 {
        180
    } else {
        bucket.min(180)
    }
}

fn quantize_angle(angle: f32) -> i16 {
    (normalize_degrees(angle) * ANGLE_SCALE).trunc() as i16
}

fn pack_pitch_and_z(view_pitch: f32, position_z: f32, policy: JointOverflowPolicy) -> (f32, bool) {
    let pitch_term = ((f64::from(view_pitch) + PITCH_BIAS) * 10.0).trunc() as i64;
    let pitch_term = pitch_term.clamp(0, MAX_PITCH_TERM) as i32;
    let z_tenths = (f64::from(position_z) * 10.0).trunc() as i64;

    match policy {
        JointOverflowPolicy::Clamp => {
            let clamped_z = z_tenths.clamp(-MAX_JOINT_Z_TENTHS, MAX_JOINT_Z_TENTHS);
            let signed_pitch = if clamped_z < 0 { -pitch_term } else { pitch_term };
            let joint = clamped_z * JOINT_SCALE + i64::from(signed_pitch);
            (joint as f32, clamped_z != z_tenths)
        }
        JointOverflowPolicy::Wrap => {
            let z_tenths = z_tenths as i32;
            let signed_pitch = if z_tenths < 0 { -pitch_term } else { pitch_term };
            let joint = z_tenths
                .wrapping_mul(JOINT_SCALE as i32)
                .wrapping_add(signed_pitch);
            (joint as f32, false)
        }
    }
}

fn unpack_pitch_and_z(field: f32) -> (f32, f32) {
    let joint = field.round() as i64;
    let z_tenths = joint / JOINT_SCALE;
    let pitch_term = (joint - z_tenths * JOINT_SCALE).abs();
    let pitch = pitch_term as f32 / 10.0 - PITCH_BIAS as f32;
    (pitch, z_tenths as f32 / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn command() -> MovementCommand {
        let mut cmd = MovementCommand {
            sequence_number: 4_821,
            tick_signal: 93_112,
            view_angles: [45.0, 90.0, 0.0],
            forward_move: 450.0,
            side_move: -225.0,
            buttons: 0b1001,
            weapon_select: 3,
            random_seed: 77,
            ..Default::default()
        };
        cmd.refresh_checksum();
        cmd
    }

    fn pose(position: Vec3, orientation: Vec3, speed: f32) -> TrackedPose {
        TrackedPose {
            position,
            orientation,
            linear_velocity: Vec3::new(speed, 0.0, 0.0),
            valid: true,
        }
    }

    fn angle_error(a: f32, b: f32) -> f32 {
        normalize_degrees(a - b).abs()
    }

    #[test]
    fn roll_130_lands_in_bucket_155() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        codec.encode(&mut cmd, &pose(Vec3::ZERO, Vec3::new(0.0, 0.0, 130.0), 0.0));
        assert_eq!(cmd.sequence_number, 4_821 + 1_550_000_000);

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert_eq!(slot.controller_orientation.z, 130.0);
        assert_eq!(cmd.sequence_number, 4_821);
    }

    #[test]
    fn joint_pitch_and_z_pack_into_one_integer() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        codec.encode(&mut cmd, &pose(Vec3::new(0.0, 0.0, 12.3), Vec3::ZERO, 0.0));
        assert_eq!(cmd.view_angles[0], 1_234_050.0);

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert_eq!(cmd.view_angles[0], 45.0);
        assert!((slot.controller_position.z - 12.3).abs() < 1e-4);
    }

    #[test]
    fn negative_z_forces_negative_pitch_term() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        codec.encode(&mut cmd, &pose(Vec3::new(0.0, 0.0, -12.3), Vec3::ZERO, 0.0));
        assert_eq!(cmd.view_angles[0], -1_234_050.0);

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert_eq!(cmd.view_angles[0], 45.0);
        assert!((slot.controller_position.z + 12.3).abs() < 1e-4);
    }

    #[test]
    fn legacy_command_passes_through() {
        let codec = TrackedInputCodec::default();
        let original = command();
        let mut cmd = original;
        let mut slot = PeerSlot {
            is_using_tracked_input: true,
            is_swinging: true,
            ..Default::default()
        };
        assert_eq!(codec.decode(&mut cmd, &mut slot), DecodeOutcome::NoPayload);
        assert_eq!(cmd, original);
        assert!(!slot.is_using_tracked_input);
        assert!(!slot.is_swinging);
    }

    #[test]
    fn unusable_pose_leaves_command_alone() {
        let codec = TrackedInputCodec::default();
        let original = command();
        let mut cmd = original;
        let mut stale = pose(Vec3::ONE, Vec3::ZERO, 0.0);
        stale.valid = false;
        assert_eq!(codec.encode(&mut cmd, &stale), EncodeOutcome::NoPayload);
        assert_eq!(cmd, original);
    }

    #[test]
    fn zero_tick_cannot_be_marked() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        cmd.tick_signal = 0;
        let outcome = codec.encode(&mut cmd, &pose(Vec3::ONE, Vec3::ZERO, 0.0));
        assert_eq!(outcome, EncodeOutcome::NoPayload);
    }

    #[test]
    fn fast_controller_sets_swing_flag() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        let outcome = codec.encode(&mut cmd, &pose(Vec3::ZERO, Vec3::new(0.0, 0.0, -90.0), 3.0));
        assert!(matches!(outcome, EncodeOutcome::Encoded { swinging: true, .. }));
        assert!(cmd.sequence_number < 0);
        assert!(cmd.checksum_matches());

        let mut slot = PeerSlot::default();
        let decoded = codec.decode(&mut cmd, &mut slot);
        assert_eq!(decoded, DecodeOutcome::Decoded { swing_start: true });
        assert!(slot.is_swinging);
        assert_eq!(slot.controller_orientation.z, -90.0);
        assert_eq!(cmd.sequence_number, 4_821);
    }

    #[test]
    fn roll_near_minus_180_keeps_swing_sign() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        cmd.sequence_number = 0;
        cmd.refresh_checksum();
        codec.encode(&mut cmd, &pose(Vec3::ZERO, Vec3::new(0.0, 0.0, -180.0), 5.0));
        assert!(cmd.sequence_number < 0);

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert!(slot.is_swinging);
        assert_eq!(cmd.sequence_number, 0);
        assert!(angle_error(slot.controller_orientation.z, -180.0) < 1e-3);
    }

    #[test]
    fn clamp_policy_bounds_large_z() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        let outcome = codec.encode(&mut cmd, &pose(Vec3::new(0.0, 0.0, 30_000.0), Vec3::ZERO, 0.0));
        assert!(matches!(outcome, EncodeOutcome::Encoded { clamped: true, .. }));

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert!((slot.controller_position.z - 21_474.7).abs() < 1e-2);
        assert!((cmd.view_angles[0] - 45.0).abs() < 10.0);
    }

    #[test]
    fn z_above_exact_float_range_still_round_trips() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        cmd.view_angles[0] = 10.0;
        cmd.refresh_checksum();
        let outcome = codec.encode(&mut cmd, &pose(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO, 0.0));
        assert!(matches!(outcome, EncodeOutcome::Encoded { clamped: false, .. }));

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert!((slot.controller_position.z - 500.0).abs() <= 0.1);
        assert!((cmd.view_angles[0] - 10.0).abs() < 1.0);
    }

    #[test]
    fn negative_z_at_bound_keeps_sign() {
        let codec = TrackedInputCodec::default();
        let mut cmd = command();
        codec.encode(&mut cmd, &pose(Vec3::new(0.0, 0.0, -21_000.0), Vec3::ZERO, 0.0));

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert!((slot.controller_position.z + 21_000.0).abs() <= 0.1);
    }

    #[test]
    fn wrap_policy_overflows_silently() {
        let codec = TrackedInputCodec::new(1.1, JointOverflowPolicy::Wrap);
        let mut cmd = command();
        let outcome = codec.encode(&mut cmd, &pose(Vec3::new(0.0, 0.0, 30_000.0), Vec3::ZERO, 0.0));
        assert!(matches!(outcome, EncodeOutcome::Encoded { clamped: false, .. }));
        assert!(cmd.checksum_matches());

        let mut slot = PeerSlot::default();
        codec.decode(&mut cmd, &mut slot);
        assert!((slot.controller_position.z - 30_000.0).abs() > 1.0);
    }

    #[test]
    fn restore_undoes_encoding_locally() {
        let codec = TrackedInputCodec::default();
        let original = command();
        let mut cmd = original;
        let outcome = codec.encode(&mut cmd, &pose(Vec3::new(3.0, 4.0, 5.0), Vec3::new(10.0, 20.0, 30.0), 4.0));
        let EncodeOutcome::Encoded { restore, .. } = outcome else {
            panic!("expected payload");
        };
        assert_ne!(cmd, original);
        restore.restore(&mut cmd);
        assert_eq!(cmd, original);
    }

    #[test]
    fn decode_shifts_previous_orientation() {
        let codec = TrackedInputCodec::default();
        let mut slot = PeerSlot::default();

        let mut first = command();
        codec.encode(&mut first, &pose(Vec3::ZERO, Vec3::new(10.0, 20.0, 0.0), 0.0));
        codec.decode(&mut first, &mut slot);

        let mut second = command();
        codec.encode(&mut second, &pose(Vec3::ZERO, Vec3::new(-30.0, 40.0, 0.0), 0.0));
        codec.decode(&mut second, &mut slot);

        assert_eq!(slot.previous_controller_orientation, Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(slot.controller_orientation, Vec3::new(-30.0, 40.0, 0.0));
    }

    proptest! {
        #[test]
        fn untouched_commands_decode_to_themselves(
            seq in 0i32..i32::MAX,
            tick in 0i32..i32::MAX,
            pitch in -89.0f32..89.0,
            yaw in -180.0f32..180.0,
            forward in -450.0f32..450.0,
            buttons in any::<i32>(),
            dx in any::<i16>(),
            dy in any::<i16>(),
        ) {
            let codec = TrackedInputCodec::default();
            let mut cmd = MovementCommand {
                sequence_number: seq,
                tick_signal: tick,
                view_angles: [pitch, yaw, 0.0],
                forward_move: forward,
                buttons,
                mouse_dx: dx,
                mouse_dy: dy,
                ..Default::default()
            };
            cmd.refresh_checksum();
            let original = cmd;
            let mut slot = PeerSlot::default();

            prop_assert_eq!(codec.decode(&mut cmd, &mut slot), DecodeOutcome::NoPayload);
            prop_assert_eq!(cmd, original);
            prop_assert!(!slot.is_using_tracked_input);
        }

        #[test]
        fn encoded_commands_round_trip(
            seq in 1i32..ROLL_SCALE,
            tick in 1i32..i32::MAX,
            view_pitch in -89.0f32..89.0,
            forward in -450.0f32..450.0,
            side in -450.0f32..450.0,
            buttons in any::<i32>(),
            (x, y, z) in (-160.0f32..160.0, -160.0f32..160.0, -21_000.0f32..21_000.0),
            pitch in -89.9f32..89.9,
            yaw in -179.9f32..179.9,
            roll in -180.0f32..180.0,
            speed in 0.0f32..4.0,
        ) {
            let codec = TrackedInputCodec::default();
            let mut cmd = MovementCommand {
                sequence_number: seq,
                tick_signal: tick,
                view_angles: [view_pitch, 12.0, 0.0],
                forward_move: forward,
                side_move: side,
                buttons,
                ..Default::default()
            };
            cmd.refresh_checksum();
            let original = cmd;

            let outcome = codec.encode(
                &mut cmd,
                &pose(Vec3::new(x, y, z), Vec3::new(pitch, yaw, roll), speed),
            );
            let swinging = matches!(outcome, EncodeOutcome::Encoded { swinging: true, .. });
            let unclamped = matches!(outcome, EncodeOutcome::Encoded { clamped: false, .. });
            prop_assert!(unclamped);
            prop_assert!(cmd.checksum_matches());

            let mut slot = PeerSlot::default();
            codec.decode(&mut cmd, &mut slot);
            prop_assert!(cmd.checksum_matches());

            prop_assert!(slot.is_using_tracked_input);
            prop_assert_eq!(slot.is_swinging, swinging);
            prop_assert_eq!(cmd.sequence_number, seq);
            prop_assert_eq!(cmd.tick_signal, tick);
            prop_assert_eq!(cmd.forward_move.to_bits(), original.forward_move.to_bits());
            prop_assert_eq!(cmd.side_move.to_bits(), original.side_move.to_bits());
            prop_assert_eq!(cmd.buttons, original.buttons);
            prop_assert_eq!(cmd.view_angles[2], 0.0);
            prop_assert_eq!(cmd.vertical_move, 0.0);
            prop_assert_eq!((cmd.mouse_dx, cmd.mouse_dy), (0, 0));

            let tolerance = 0.1 + 1e-3;
            // The joint value leaves the exact f32 range past |z| = 167.6.
            let pitch_tolerance = if z.abs() < 167.0 { tolerance } else { 6.6 };
            prop_assert!((cmd.view_angles[0] - view_pitch).abs() <= pitch_tolerance);
            prop_assert!(angle_error(slot.controller_orientation.z, roll) <= 1.0 + 1e-3);
            prop_assert!((slot.controller_orientation.x - pitch).abs() <= tolerance);
            prop_assert!((slot.controller_orientation.y - yaw).abs() <= tolerance);
            prop_assert!((slot.controller_position.x - x).abs() <= tolerance);
            prop_assert!((slot.controller_position.y - y).abs() <= tolerance);
            prop_assert!((slot.controller_position.z - z).abs() <= tolerance);
        }

        #[test]
        fn every_encode_branch_keeps_checksum_valid(
            speed in 0.0f32..4.0,
            z in -30_000.0f32..30_000.0,
            wrap in any::<bool>(),
        ) {
            let policy = if wrap { JointOverflowPolicy::Wrap } else { JointOverflowPolicy::Clamp };
            let codec = TrackedInputCodec::new(1.1, policy);
            let mut cmd = command();
            codec.encode(&mut cmd, &pose(Vec3::new(1.0, 2.0, z), Vec3::new(5.0, 6.0, 7.0), speed));
            prop_assert!(cmd.checksum_matches());
        }
    }
}
