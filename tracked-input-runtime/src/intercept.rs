//! Seam between the runtime and whatever detour mechanism the loader uses.
//!
//! The runtime never patches code itself. A loader hands in an [`Interceptor`]
//! and the hook table; each hook that fails to install disables only the
//! feature it belongs to.

use std::thread;
use std::time::Duration;

use crate::error::{TrackedInputError, TrackedInputResult};

/// Independent pieces of functionality, each backed by one hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Encoding outgoing commands.
    CommandEncode,
    /// Decoding commands in the receiving command-processing entry point.
    CommandDecode,
    MeleeSweep,
    /// Render-side eye position override from peer slots.
    EyeOverride,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::CommandEncode,
        Feature::CommandDecode,
        Feature::MeleeSweep,
        Feature::EyeOverride,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSet {
    bits: u8,
}

impl FeatureSet {
    pub fn all() -> Self {
        let mut set = Self::default();
        for feature in Feature::ALL {
            set.enable(feature);
        }
        set
    }

    fn bit(feature: Feature) -> u8 {
        1 << feature as u8
    }

    pub fn enable(&mut self, feature: Feature) {
        self.bits |= Self::bit(feature);
    }

    pub fn disable(&mut self, feature: Feature) {
        self.bits &= !Self::bit(feature);
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.bits & Self::bit(feature) != 0
    }
}

/// An installed hook. `original` is the trampoline to the replaced function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle {
    pub target: usize,
    pub original: usize,
}

impl HookHandle {
    /// Reinterprets the trampoline as a typed function pointer.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the hooked function's ABI
    /// and signature.
    pub unsafe fn original<F: Copy>(&self) -> F {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
        std::mem::transmute_copy(&self.original)
    }
}

pub trait Interceptor {
    /// Starts the detour subsystem. Failure here is fatal.
    fn initialize(&mut self) -> Result<(), String>;
    fn install(&mut self, target: usize, replacement: usize) -> Result<HookHandle, String>;
    fn uninstall(&mut self, handle: &HookHandle) -> Result<(), String>;
}

/// Where a hook goes and what replaces it.
pub struct HookSpec {
    pub feature: Feature,
    pub name: &'static str,
    /// Returns the target address once the host has created it.
    pub locate: Box<dyn FnMut() -> Option<usize>>,
    pub replacement: usize,
}

/// Polls `probe` until it yields an address, sleeping between attempts.
pub fn resolve_with_retry<F>(
    what: &str,
    mut probe: F,
    attempts: u32,
    interval: Duration,
) -> TrackedInputResult<usize>
where
    F: FnMut() -> Option<usize>,
{
    for attempt in 1..=attempts {
        if let Some(address) = probe().filter(|&address| address != 0) {
            log::debug!("Resolved {} after {} attempt(s)", what, attempt);
            return Ok(address);
        }
        if attempt < attempts {
            thread::sleep(interval);
        }
    }

    Err(TrackedInputError::AddressResolutionTimeout {
        what: what.to_string(),
        attempts,
    })
}

/// Installs every hook, returning handles and the features left enabled.
pub fn install_hooks<I: Interceptor + ?Sized>(
    interceptor: &mut I,
    specs: Vec<HookSpec>,
    attempts: u32,
    interval: Duration,
) -> TrackedInputResult<(Vec<(Feature, HookHandle)>, FeatureSet)> {
    interceptor
        .initialize()
        .map_err(TrackedInputError::InitializationFailure)?;

    let mut features = FeatureSet::all();
    let mut handles = Vec::new();

    for mut spec in specs {
        let installed = resolve_with_retry(spec.name, &mut spec.locate, attempts, interval)
            .and_then(|target| {
                interceptor
                    .install(target, spec.replacement)
                    .map_err(|reason| TrackedInputError::HookInstallFailure {
                        feature: spec.feature,
                        reason,
                    })
            });

        match installed {
            Ok(handle) => {
                log::info!("Hooked {} at {:#x}", spec.name, handle.target);
                handles.push((spec.feature, handle));
            }
            Err(e) => {
                log::error!("{}; {:?} disabled", e, spec.feature);
                features.disable(spec.feature);
            }
        }
    }

    Ok((handles, features))
}
