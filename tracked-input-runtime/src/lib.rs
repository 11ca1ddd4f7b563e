pub mod capture;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod intercept;
pub mod layout;
pub mod melee;
pub mod movement;
pub mod peers;
pub mod pose;
pub mod types;
mod utils;

use env_logger::Builder;
use std::panic;

use codec::{DecodeOutcome, EncodeOutcome};
use config::TrackedInputConfig;
use context::init_tracked_input;
use melee::NativeMeleeWeapon;
use pose::{RawPose, TrackedPose};
use types::RawPeerSlot;
use utils::{execute_safely, host_bytes, with_context};

// C - API

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static tracked_input_api_version: u32 = 1;

#[no_mangle]
pub extern "C" fn TrackedInputInit(host_command_size: u32) -> i32 {
    // Set up a panic hook that logs panics but doesn't abort
    panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic in tracked input module: {:?}", panic_info);
    }));

    let mut builder = Builder::from_default_env();

    #[cfg(debug_assertions)]
    builder.filter_level(log::LevelFilter::Debug);
    #[cfg(not(debug_assertions))]
    builder.filter_level(log::LevelFilter::Info);

    let _ = builder.try_init();

    execute_safely("TrackedInputInit", || {
        let config = match TrackedInputConfig::load() {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load tracked input config: {}", e);
                return 0;
            }
        };

        match init_tracked_input(config, host_command_size as usize) {
            Ok(_) => {
                log::info!("Tracked input module initialized");
                1
            }
            Err(e) => {
                log::error!("Tracked input disabled: {}", e);
                0
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn TrackedInputSetLocalPose(peer: i32, pose: *const RawPose) -> i32 {
    execute_safely("TrackedInputSetLocalPose", || {
        if pose.is_null() {
            return 0;
        }
        let pose = TrackedPose::from(unsafe { *pose });

        with_context(
            |context| match context.set_local_pose(peer, &pose) {
                Ok(_) => 1,
                Err(e) => {
                    log::error!("Failed to set local pose: {}", e);
                    0
                }
            },
            0,
        )
    })
}

/// Returns 1 when the command now carries a tracked payload.
#[no_mangle]
pub extern "C" fn TrackedInputEncodeCommand(cmd: *mut u8, len: usize, pose: *const RawPose) -> i32 {
    execute_safely("TrackedInputEncodeCommand", || {
        let Some(bytes) = (unsafe { host_bytes(cmd, len) }) else {
            return 0;
        };
        let pose = if pose.is_null() {
            TrackedPose::default()
        } else {
            TrackedPose::from(unsafe { *pose })
        };

        with_context(
            |context| {
                let mut command = match context.layout.read(bytes) {
                    Ok(command) => command,
                    Err(e) => {
                        log::error!("Failed to read outgoing command: {}", e);
                        return 0;
                    }
                };

                let outcome = context.prepare_outgoing(&mut command, &pose);
                if let Err(e) = context.layout.write(&command, bytes) {
                    log::error!("Failed to write outgoing command: {}", e);
                    return 0;
                }

                match outcome {
                    EncodeOutcome::Encoded { .. } => 1,
                    EncodeOutcome::NoPayload => 0,
                }
            },
            0,
        )
    })
}

/// Called after transmission to restore the local copy of the last encoded command.
#[no_mangle]
pub extern "C" fn TrackedInputRestoreCommand(cmd: *mut u8, len: usize) -> i32 {
    execute_safely("TrackedInputRestoreCommand", || {
        let Some(bytes) = (unsafe { host_bytes(cmd, len) }) else {
            return 0;
        };

        with_context(
            |context| {
                let Ok(mut command) = context.layout.read(bytes) else {
                    return 0;
                };
                if !context.finish_outgoing(&mut command) {
                    return 0;
                }
                match context.layout.write(&command, bytes) {
                    Ok(_) => 1,
                    Err(e) => {
                        log::error!("Failed to restore local command: {}", e);
                        0
                    }
                }
            },
            0,
        )
    })
}

/// Returns 1 for a tracked payload, 0 for a legacy command, -1 on error.
#[no_mangle]
pub extern "C" fn TrackedInputDecodeCommand(peer: i32, cmd: *mut u8, len: usize) -> i32 {
    execute_safely("TrackedInputDecodeCommand", || {
        let Some(bytes) = (unsafe { host_bytes(cmd, len) }) else {
            return -1;
        };

        with_context(
            |context| {
                let mut command = match context.layout.read(bytes) {
                    Ok(command) => command,
                    Err(e) => {
                        log::error!("Failed to read incoming command: {}", e);
                        return -1;
                    }
                };

                match context.process_incoming(peer, &mut command) {
                    Ok(DecodeOutcome::NoPayload) => 0,
                    Ok(DecodeOutcome::Decoded { .. }) => match context.layout.write(&command, bytes) {
                        Ok(_) => 1,
                        Err(e) => {
                            log::error!("Failed to write decoded command: {}", e);
                            -1
                        }
                    },
                    Err(e) => {
                        log::error!("Failed to decode command from peer {}: {}", peer, e);
                        -1
                    }
                }
            },
            -1,
        )
    })
}

/// Returns the number of collision probes issued this tick.
#[no_mangle]
pub extern "C" fn TrackedInputRunMeleeSweep(peer: i32, weapon: *mut NativeMeleeWeapon) -> i32 {
    execute_safely("TrackedInputRunMeleeSweep", || {
        if weapon.is_null() {
            return 0;
        }
        let weapon = unsafe { &mut *weapon };

        with_context(
            |context| match context.run_sweep(peer, weapon) {
                Ok(report) => report.probes as i32,
                Err(e) => {
                    log::error!("Melee sweep failed for peer {}: {}", peer, e);
                    0
                }
            },
            0,
        )
    })
}

#[no_mangle]
pub extern "C" fn TrackedInputGetPeerSlot(peer: i32, out: *mut RawPeerSlot) -> i32 {
    execute_safely("TrackedInputGetPeerSlot", || {
        if out.is_null() {
            return 0;
        }

        with_context(
            |context| match context.peer(peer) {
                Ok(slot) => {
                    unsafe { out.write(RawPeerSlot::from(slot)) };
                    1
                }
                Err(_) => 0,
            },
            0,
        )
    })
}

#[no_mangle]
pub extern "C" fn TrackedInputResetPeer(peer: i32) -> i32 {
    execute_safely("TrackedInputResetPeer", || {
        with_context(
            |context| match context.disconnect(peer) {
                Ok(_) => 1,
                Err(e) => {
                    log::error!("Failed to reset peer {}: {}", peer, e);
                    0
                }
            },
            0,
        )
    })
}
