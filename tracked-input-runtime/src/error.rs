use thiserror::Error;

use crate::intercept::Feature;

/// Errors raised by the tracked input runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackedInputError {
    /// The interception subsystem itself could not start. Fatal for the mod.
    #[error("interception subsystem failed to initialize: {0}")]
    InitializationFailure(String),

    /// A single hook could not be installed; only `feature` is disabled.
    #[error("failed to install hook for {feature:?}: {reason}")]
    HookInstallFailure { feature: Feature, reason: String },

    /// A lazily initialized host pointer never appeared.
    #[error("address for {what} not resolved after {attempts} attempts")]
    AddressResolutionTimeout { what: String, attempts: u32 },

    #[error("peer index {peer} out of range (max {max})")]
    PeerOutOfRange { peer: i32, max: usize },

    /// The host's command struct does not match the expected layout.
    #[error("movement command layout mismatch: {0}")]
    LayoutMismatch(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type TrackedInputResult<T> = Result<T, TrackedInputError>;
