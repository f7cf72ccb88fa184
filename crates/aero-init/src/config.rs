//! Boot configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use alloc::string::{String, ToString};

use aero_kernel_core::KernelConfig;
use serde::{Deserialize, Serialize};

use crate::BootError;

/// Authentication gate options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Denied attempts (failures and timeouts) before boot fails
    pub retry_limit: u32,
    /// Wait for a verification result, in ticks
    pub verification_timeout_ticks: u64,
    /// User the gate asks the service to verify
    pub user_id: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            // 30 s at 100 Hz
            verification_timeout_ticks: 3000,
            user_id: 1,
        }
    }
}

/// Biometric sensor publishers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Spawn `hrv_sensor` and `eeg_sensor` after the auth service
    pub enabled: bool,
    /// Publish interval
    pub period_ticks: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ticks: 10,
        }
    }
}

/// Everything `boot` needs
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    pub kernel: KernelConfig,
    pub gate: GateConfig,
    pub sensors: SensorConfig,
}

impl BootConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, BootError> {
        serde_json::from_str(text).map_err(|e| BootError::Config(e.to_string()))
    }

    /// Serialize back to pretty JSON.
    pub fn to_json(&self) -> Result<String, BootError> {
        serde_json::to_string_pretty(self).map_err(|e| BootError::Config(e.to_string()))
    }
}
