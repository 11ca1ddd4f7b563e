use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::JointOverflowPolicy;
use crate::error::{TrackedInputError, TrackedInputResult};
use crate::layout::HostBuild;
use crate::melee::DEFAULT_SWING_OFFSET_DEGREES;

pub const CONFIG_ENV: &str = "TRACKED_INPUT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "tracked_input.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedInputConfig {
    /// Controller speed above which a melee swing is signalled.
    pub melee_speed_threshold: f32,
    pub swing_offset_degrees: f32,
    pub joint_overflow: JointOverflowPolicy,
    pub host_build: HostBuild,
    pub axis_button_deadzone: f32,
    pub resolve_attempts: u32,
    pub resolve_interval_ms: u64,
}

impl Default for TrackedInputConfig {
    fn default() -> Self {
        Self {
            melee_speed_threshold: 1.1,
            swing_offset_degrees: DEFAULT_SWING_OFFSET_DEGREES,
            joint_overflow: JointOverflowPolicy::Clamp,
            host_build: HostBuild::Native,
            axis_button_deadzone: 225.0,
            resolve_attempts: 50,
            resolve_interval_ms: 100,
        }
    }
}

impl TrackedInputConfig {
    pub fn from_json(json: &str) -> TrackedInputResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TrackedInputError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> TrackedInputResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TrackedInputError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// `$TRACKED_INPUT_CONFIG`, then `tracked_input.json` if present, then defaults.
    pub fn load() -> TrackedInputResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(&PathBuf::from(path));
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            return Self::from_file(fallback);
        }

        log::debug!("No tracked input config found, using defaults");
        Ok(Self::default())
    }

    fn check(&self) -> TrackedInputResult<()> {
        if !self.melee_speed_threshold.is_finite() || self.melee_speed_threshold < 0.0 {
            return Err(TrackedInputError::Config(format!(
                "melee_speed_threshold must be a non-negative number, got {}",
                self.melee_speed_threshold
            )));
        }
        if !self.swing_offset_degrees.is_finite() {
            return Err(TrackedInputError::Config(
                "swing_offset_degrees must be finite".to_string(),
            ));
        }
        if self.resolve_attempts == 0 {
            return Err(TrackedInputError::Config(
                "resolve_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
