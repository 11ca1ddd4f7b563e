use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use glam::Vec3;
use log::{debug, error, info};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
};
use tracked_input_runtime::{
    capture::{parse_capture_line, CaptureEvent},
    codec::{DecodeOutcome, EncodeOutcome},
    config::TrackedInputConfig,
    context::TrackedInputContext,
    layout::{CommandLayout, HostBuild},
    melee::MeleeWeapon,
    types::{MovementCommand, PeerSlot},
};

// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON-lines capture of command traffic
    #[clap(short, long)]
    capture: PathBuf,

    /// Config file, defaults to the runtime's lookup
    #[clap(long)]
    config: Option<PathBuf>,

    /// Host build whose command layout the capture came from
    #[clap(short, long, value_parser = parse_build)]
    build: Option<HostBuild>,
}

fn parse_build(value: &str) -> Result<HostBuild, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown host build '{}'", value))
}

// Records written to stdout, one per line
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
enum ReplayRecord {
    Encoded {
        wire: MovementCommand,
        swinging: bool,
        clamped: bool,
    },
    Decoded {
        peer: i32,
        tracked: bool,
        command: MovementCommand,
        slot: PeerSlot,
        probes: u32,
        swing_angle: f32,
    },
}

/// Stands in for the host weapon: records the probes instead of tracing.
#[derive(Default)]
struct ReplayWeapon {
    melee: bool,
    probes: Vec<(Vec3, Vec3)>,
}

impl MeleeWeapon for ReplayWeapon {
    fn is_melee(&self) -> bool {
        self.melee
    }

    fn prime_attack(&mut self) {}

    fn reset_hit_registry(&mut self) {
        debug!("Hit registry reset");
    }

    fn probe(&mut self, origin: Vec3, direction: Vec3) {
        self.probes.push((origin, direction));
    }
}

fn main() -> Result<()> {
    let mut builder = Builder::from_default_env();

    #[cfg(debug_assertions)]
    builder.filter_level(log::LevelFilter::Debug);
    #[cfg(not(debug_assertions))]
    builder.filter_level(log::LevelFilter::Info);

    builder.init();

    // Parse command line arguments
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackedInputConfig::from_file(path)?,
        None => TrackedInputConfig::load()?,
    };
    if let Some(build) = args.build {
        config.host_build = build;
    }

    let host_size = CommandLayout::for_build(config.host_build).size;
    let mut context = TrackedInputContext::new(config, host_size)?;

    let file = File::open(&args.capture)
        .with_context(|| format!("opening capture {}", args.capture.display()))?;
    info!("Replaying {}", args.capture.display());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut events = 0usize;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let event = match parse_capture_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                error!("Line {}: failed to parse event ({})", index + 1, e);
                continue;
            }
        };

        if let Some(record) = replay_event(&mut context, event)? {
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
        }
        events += 1;
    }

    info!("Replayed {} events", events);
    Ok(())
}

fn replay_event(context: &mut TrackedInputContext, event: CaptureEvent) -> Result<Option<ReplayRecord>> {
    match event {
        CaptureEvent::LocalPose { peer, pose } => {
            context.set_local_pose(peer, &pose)?;
            Ok(None)
        }

        CaptureEvent::Outgoing { mut command, pose } => {
            let outcome = context.prepare_outgoing(&mut command, &pose);
            let wire = command;
            context.finish_outgoing(&mut command);

            match outcome {
                EncodeOutcome::Encoded {
                    swinging, clamped, ..
                } => Ok(Some(ReplayRecord::Encoded {
                    wire,
                    swinging,
                    clamped,
                })),
                EncodeOutcome::NoPayload => {
                    debug!("Outgoing command {} sent without payload", wire.sequence_number);
                    Ok(None)
                }
            }
        }

        CaptureEvent::Incoming {
            peer,
            mut command,
            melee,
        } => {
            let outcome = context.process_incoming(peer, &mut command)?;
            let mut weapon = ReplayWeapon {
                melee,
                ..Default::default()
            };
            let report = context.run_sweep(peer, &mut weapon)?;

            Ok(Some(ReplayRecord::Decoded {
                peer,
                tracked: matches!(outcome, DecodeOutcome::Decoded { .. }),
                command,
                slot: *context.peer(peer)?,
                probes: report.probes,
                swing_angle: report.swing_angle,
            }))
        }

        CaptureEvent::Disconnect { peer } => {
            context.disconnect(peer)?;
            Ok(None)
        }
    }
}
