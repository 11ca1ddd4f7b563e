use anyhow::Result;
use std::sync::{Mutex, OnceLock};

use crate::codec::{DecodeOutcome, EncodeOutcome, PendingRestore, TrackedInputCodec, ROLL_SCALE};
use crate::config::TrackedInputConfig;
use crate::error::TrackedInputResult;
use crate::intercept::{Feature, FeatureSet};
use crate::layout::CommandLayout;
use crate::melee::{MeleeSweep, MeleeWeapon, SweepReport, SwingPhase};
use crate::movement::apply_axis_buttons;
use crate::peers::PeerTrackedInputTable;
use crate::pose::{DeviceRole, PoseSource, TrackedPose};
use crate::types::{MovementCommand, PeerSlot};

// Process-level instance, created by `TrackedInputInit`. Only the C entry
// points reach it; everything below takes the context by reference.
pub static TRACKED_INPUT: OnceLock<Mutex<TrackedInputContext>> = OnceLock::new();

/// Builds the context and installs it as the process-level instance.
pub fn init_tracked_input(config: TrackedInputConfig, host_command_size: usize) -> Result<()> {
    let context = TrackedInputContext::new(config, host_command_size)?;
    if TRACKED_INPUT.set(Mutex::new(context)).is_err() {
        log::warn!("Tracked input already initialized, keeping the existing context");
    }
    Ok(())
}

/// Everything the codec, peer table and sweep need for one session.
pub struct TrackedInputContext {
    pub config: TrackedInputConfig,
    pub layout: CommandLayout,
    pub codec: TrackedInputCodec,
    pub peers: PeerTrackedInputTable,
    pub sweep: MeleeSweep,
    pub features: FeatureSet,
    pending_restore: Option<PendingRestore>,
    sequence_exhausted: bool,
}

impl TrackedInputContext {
    pub fn new(config: TrackedInputConfig, host_command_size: usize) -> TrackedInputResult<Self> {
        let layout = CommandLayout::for_build(config.host_build);
        layout.validate(host_command_size)?;

        log::info!(
            "Tracked input ready: {:?} layout, swing threshold {}, joint overflow {:?}",
            layout.build,
            config.melee_speed_threshold,
            config.joint_overflow
        );

        Ok(Self {
            codec: TrackedInputCodec::new(config.melee_speed_threshold, config.joint_overflow),
            sweep: MeleeSweep::new(config.swing_offset_degrees),
            peers: PeerTrackedInputTable::new(),
            features: FeatureSet::all(),
            pending_restore: None,
            sequence_exhausted: false,
            layout,
            config,
        })
    }

    /// Finalizes an outgoing command: axis buttons, then the tracked payload.
    pub fn prepare_outgoing(&mut self, cmd: &mut MovementCommand, pose: &TrackedPose) -> EncodeOutcome {
        apply_axis_buttons(cmd, self.config.axis_button_deadzone);

        if !self.features.is_enabled(Feature::CommandEncode) {
            return EncodeOutcome::NoPayload;
        }

        let outcome = self.codec.encode(cmd, pose);
        match outcome {
            EncodeOutcome::Encoded {
                restore, clamped, ..
            } => {
                if clamped {
                    log::debug!(
                        "Controller z {} clamped to the joint field bound",
                        pose.position.z
                    );
                }
                self.pending_restore = Some(restore);
            }
            EncodeOutcome::NoPayload => {
                if cmd.sequence_number >= ROLL_SCALE && !self.sequence_exhausted {
                    log::warn!(
                        "Sequence number {} no longer leaves room for the roll, tracked input stops here",
                        cmd.sequence_number
                    );
                    self.sequence_exhausted = true;
                }
                self.pending_restore = None;
            }
        }
        outcome
    }

    pub fn prepare_outgoing_from<S: PoseSource + ?Sized>(
        &mut self,
        cmd: &mut MovementCommand,
        source: &S,
    ) -> EncodeOutcome {
        let pose = source
            .pose(DeviceRole::PrimaryController)
            .unwrap_or_default();
        self.prepare_outgoing(cmd, &pose)
    }

    /// Undoes the last encode on the local copy once it has been sent.
    pub fn finish_outgoing(&mut self, cmd: &mut MovementCommand) -> bool {
        match self.pending_restore.take() {
            Some(restore) => {
                restore.restore(cmd);
                true
            }
            None => false,
        }
    }

    /// Runs first on every received command.
    pub fn process_incoming(
        &mut self,
        peer: i32,
        cmd: &mut MovementCommand,
    ) -> TrackedInputResult<DecodeOutcome> {
        let slot = self.peers.get_mut(peer)?;
        if !self.features.is_enabled(Feature::CommandDecode) {
            return Ok(DecodeOutcome::NoPayload);
        }

        let outcome = self.codec.decode(cmd, slot);
        if let DecodeOutcome::Decoded { swing_start: true } = outcome {
            log::debug!("Peer {} started a swing", peer);
        }
        Ok(outcome)
    }

    pub fn set_local_pose(&mut self, peer: i32, pose: &TrackedPose) -> TrackedInputResult<()> {
        self.peers
            .set_local_pose(peer, pose, self.config.melee_speed_threshold)
    }

    pub fn run_sweep<W: MeleeWeapon + ?Sized>(
        &mut self,
        peer: i32,
        weapon: &mut W,
    ) -> TrackedInputResult<SweepReport> {
        let slot = self.peers.get(peer)?;
        if !self.features.is_enabled(Feature::MeleeSweep) {
            return Ok(SweepReport {
                phase: SwingPhase::Idle,
                probes: 0,
                swing_angle: 0.0,
                registry_reset: false,
            });
        }
        self.sweep.run(peer, slot, weapon)
    }

    pub fn peer(&self, peer: i32) -> TrackedInputResult<&PeerSlot> {
        self.peers.get(peer)
    }

    pub fn disconnect(&mut self, peer: i32) -> TrackedInputResult<()> {
        log::info!("Peer {} disconnected, clearing tracked input", peer);
        self.peers.reset(peer)
    }
}
