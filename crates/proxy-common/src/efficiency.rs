//! Efficiency mode data model: the fixed mode table (spec §4.3) and the
//! system inputs Auto-mode resolution reads.

use crate::types::HardwareClass;
use serde::{Deserialize, Serialize};

/// User-selected (or Auto-resolved) operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyMode {
    Performance,
    Balanced,
    Efficiency,
    Quiet,
    UltraEfficiency,
    Auto,
}

/// The fixed, per-mode parameters a mode (other than `Auto`) maps to.
/// `max_power_watts`/`max_fan_percent`/`max_temperature_c` of `None` mean
/// unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub preferred_hardware: Vec<HardwareClass>,
    pub max_power_watts: Option<f32>,
    pub max_fan_percent: f32,
    pub max_temperature_c: f32,
    pub override_critical: bool,
    pub throttle_latency_critical: bool,
}

/// Look up the fixed parameters for a concrete (non-`Auto`) mode. Values are
/// the contract from spec §4.3 and must be reproduced exactly.
pub fn mode_config(mode: EfficiencyMode) -> ModeConfig {
    use HardwareClass::*;
    match mode {
        EfficiencyMode::Performance => ModeConfig {
            preferred_hardware: vec![Gpu, Igpu, Npu],
            max_power_watts: None,
            max_fan_percent: 100.0,
            max_temperature_c: 90.0,
            override_critical: false,
            throttle_latency_critical: false,
        },
        EfficiencyMode::Balanced => ModeConfig {
            preferred_hardware: vec![Igpu, Gpu, Npu],
            max_power_watts: Some(60.0),
            max_fan_percent: 80.0,
            max_temperature_c: 85.0,
            override_critical: true,
            throttle_latency_critical: false,
        },
        EfficiencyMode::Efficiency => ModeConfig {
            preferred_hardware: vec![Npu, Igpu, Gpu],
            max_power_watts: Some(15.0),
            max_fan_percent: 60.0,
            max_temperature_c: 75.0,
            override_critical: true,
            throttle_latency_critical: true,
        },
        EfficiencyMode::Quiet => ModeConfig {
            preferred_hardware: vec![Npu, Igpu],
            max_power_watts: Some(15.0),
            max_fan_percent: 40.0,
            max_temperature_c: 70.0,
            override_critical: true,
            throttle_latency_critical: true,
        },
        EfficiencyMode::UltraEfficiency => ModeConfig {
            preferred_hardware: vec![Npu],
            max_power_watts: Some(5.0),
            max_fan_percent: 30.0,
            max_temperature_c: 65.0,
            override_critical: true,
            throttle_latency_critical: true,
        },
        EfficiencyMode::Auto => {
            // Auto is resolved to a concrete mode before this table is
            // consulted; callers should never ask for Auto's own config.
            ModeConfig {
                preferred_hardware: vec![],
                max_power_watts: None,
                max_fan_percent: 100.0,
                max_temperature_c: 85.0,
                override_critical: true,
                throttle_latency_critical: false,
            }
        }
    }
}

/// Inputs the Auto-mode resolution rule chain reads (spec §4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemState {
    pub battery_percent: f32,
    pub on_battery: bool,
    pub avg_temp_c: f32,
    pub avg_fan_pct: f32,
    pub quiet_hours: bool,
}
