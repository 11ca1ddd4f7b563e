//! Multi-probe melee collision sweep driven by decoded controller state.
//!
//! A single probe per tick lets fast swings pass through a target between two
//! widely separated directions, so each tick the arc between the previous and
//! current controller orientation is sampled [`SWEEP_SAMPLES`] times.

use std::ffi::c_void;

use glam::{Quat, Vec3};

use crate::error::TrackedInputResult;
use crate::peers::{peer_index, MAX_PEERS};
use crate::types::PeerSlot;

pub const SWEEP_SAMPLES: u32 = 10;
pub const DEFAULT_SWING_OFFSET_DEGREES: f32 = 50.0;

/// Native weapon operations the sweep needs from the host.
pub trait MeleeWeapon {
    fn is_melee(&self) -> bool;
    /// Primes the attack metadata the native collision test reads.
    fn prime_attack(&mut self);
    /// Forgets which entities this swing already hit.
    fn reset_hit_registry(&mut self);
    fn probe(&mut self, origin: Vec3, direction: Vec3);
}

/// Weapon callbacks supplied by the host through the C entry points.
#[repr(C)]
pub struct NativeMeleeWeapon {
    pub user: *mut c_void,
    pub is_melee: extern "C" fn(user: *mut c_void) -> u8,
    pub prime_attack: extern "C" fn(user: *mut c_void),
    pub reset_hit_registry: extern "C" fn(user: *mut c_void),
    /// `origin` and `direction` point at three floats each.
    pub probe: extern "C" fn(user: *mut c_void, origin: *const f32, direction: *const f32),
}

impl MeleeWeapon for NativeMeleeWeapon {
    fn is_melee(&self) -> bool {
        (self.is_melee)(self.user) != 0
    }

    fn prime_attack(&mut self) {
        (self.prime_attack)(self.user)
    }

    fn reset_hit_registry(&mut self) {
        (self.reset_hit_registry)(self.user)
    }

    fn probe(&mut self, origin: Vec3, direction: Vec3) {
        let origin = origin.to_array();
        let direction = direction.to_array();
        (self.probe)(self.user, origin.as_ptr(), direction.as_ptr())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SwingPhase {
    #[default]
    Idle,
    /// Swing start observed, no probes issued yet.
    Armed,
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepReport {
    pub phase: SwingPhase,
    pub probes: u32,
    pub swing_angle: f32,
    pub registry_reset: bool,
}

/// Forward and right vectors for pitch/yaw/roll in degrees.
pub fn angle_vectors(angles: Vec3) -> (Vec3, Vec3) {
    let (sp, cp) = angles.x.to_radians().sin_cos();
    let (sy, cy) = angles.y.to_radians().sin_cos();
    let (sr, cr) = angles.z.to_radians().sin_cos();

    let forward = Vec3::new(cp * cy, cp * sy, -sp);
    let right = Vec3::new(
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    );
    (forward, right)
}

/// Arc swept by the blade between two controller orientations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingArc {
    pub initial: Vec3,
    pub end: Vec3,
    pub axis: Vec3,
    pub angle_degrees: f32,
}

impl SwingArc {
    pub fn between(previous: Vec3, current: Vec3, offset_degrees: f32) -> Self {
        let (initial, fallback_axis) = blade_direction(previous, offset_degrees);
        let (end, _) = blade_direction(current, offset_degrees);

        let cross = initial.cross(end);
        let axis = if cross.length_squared() > f32::EPSILON {
            cross.normalize()
        } else {
            fallback_axis
        };
        // atan2 form of acos(dot), exact for identical directions
        let angle_degrees = cross.length().atan2(initial.dot(end)).to_degrees();

        Self {
            initial,
            end,
            axis,
            angle_degrees,
        }
    }

    /// Evenly spaced directions from one step past `initial` up to `end`.
    pub fn samples(&self, count: u32) -> impl Iterator<Item = Vec3> {
        let step_degrees = self.angle_degrees / count as f32;
        let step = Quat::from_axis_angle(self.axis, step_degrees.to_radians());
        let mut direction = self.initial;
        (0..count).map(move |_| {
            direction = step * direction;
            direction
        })
    }
}

fn blade_direction(orientation: Vec3, offset_degrees: f32) -> (Vec3, Vec3) {
    let (forward, right) = angle_vectors(orientation);
    let tilt = Quat::from_axis_angle(right, offset_degrees.to_radians());
    (tilt * forward, right)
}

/// Per-peer swing state machine: `Idle -> Armed -> InProgress -> Idle`.
#[derive(Debug, Clone)]
pub struct MeleeSweep {
    offset_degrees: f32,
    phases: Box<[SwingPhase; MAX_PEERS]>,
}

impl Default for MeleeSweep {
    fn default() -> Self {
        Self::new(DEFAULT_SWING_OFFSET_DEGREES)
    }
}

impl MeleeSweep {
    pub fn new(offset_degrees: f32) -> Self {
        Self {
            offset_degrees,
            phases: Box::new([SwingPhase::Idle; MAX_PEERS]),
        }
    }

    pub fn phase(&self, peer: i32) -> TrackedInputResult<SwingPhase> {
        Ok(self.phases[peer_index(peer)?])
    }

    /// Advances the peer's swing for this tick and probes along the arc when a
    /// melee weapon is active. Runs all probes before returning.
    pub fn run<W: MeleeWeapon + ?Sized>(
        &mut self,
        peer: i32,
        slot: &PeerSlot,
        weapon: &mut W,
    ) -> TrackedInputResult<SweepReport> {
        let phase = &mut self.phases[peer_index(peer)?];
        let mut report = SweepReport {
            phase: SwingPhase::Idle,
            probes: 0,
            swing_angle: 0.0,
            registry_reset: false,
        };

        if !slot.is_using_tracked_input || !slot.is_swinging {
            *phase = SwingPhase::Idle;
            return Ok(report);
        }

        if slot.is_swing_start && *phase == SwingPhase::Idle {
            weapon.reset_hit_registry();
            report.registry_reset = true;
            *phase = SwingPhase::Armed;
        }

        if !weapon.is_melee() {
            report.phase = *phase;
            return Ok(report);
        }

        let arc = SwingArc::between(
            slot.previous_controller_orientation,
            slot.controller_orientation,
            self.offset_degrees,
        );

        weapon.prime_attack();
        for direction in arc.samples(SWEEP_SAMPLES) {
            weapon.probe(slot.controller_position, direction);
            report.probes += 1;
        }

        log::trace!(
            "Peer {} swept {:.1} degrees in {} probes",
            peer,
            arc.angle_degrees,
            report.probes
        );

        *phase = SwingPhase::InProgress;
        report.phase = *phase;
        report.swing_angle = arc.angle_degrees;
        Ok(report)
    }
}
