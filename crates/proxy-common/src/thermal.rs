//! Thermal data model: per-hardware sensor snapshots, configured thresholds,
//! and the sensor interface the monitor depends on.

use crate::error::Result;
use crate::types::HardwareClass;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One hardware class's instantaneous thermal reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalState {
    pub temperature_c: f32,
    pub fan_percent: f32,
    pub fan_rpm: Option<u32>,
    pub power_draw_w: Option<f32>,
    pub utilization_pct: f32,
    pub throttling: bool,
    pub updated_at: DateTime<Utc>,
}

impl ThermalState {
    /// Classify this reading against the configured thresholds (spec §4.2).
    /// `throttling` is recomputed here too: fan at or above the "loud"
    /// threshold, or temperature at or above critical.
    pub fn classify(&self, config: &ThermalConfig) -> ThermalLevel {
        if self.temperature_c >= config.temp_shutdown {
            ThermalLevel::Shutdown
        } else if self.temperature_c >= config.temp_critical {
            ThermalLevel::Critical
        } else if self.temperature_c >= config.temp_warning {
            ThermalLevel::Warning
        } else {
            ThermalLevel::Normal
        }
    }

    pub fn is_throttling(&self, config: &ThermalConfig) -> bool {
        self.fan_percent >= config.fan_loud || self.temperature_c >= config.temp_critical
    }
}

/// Classification derived from a `ThermalState` reading against a
/// `ThermalConfig` (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalLevel {
    Normal,
    Warning,
    Critical,
    Shutdown,
}

/// Thresholds governing thermal classification and hysteresis, per
/// hardware class or shared across all of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThermalConfig {
    pub temp_warning: f32,
    pub temp_critical: f32,
    pub temp_shutdown: f32,
    pub fan_quiet: f32,
    pub fan_moderate: f32,
    pub fan_loud: f32,
    pub cooldown_time: Duration,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            temp_warning: 75.0,
            temp_critical: 90.0,
            temp_shutdown: 100.0,
            fan_quiet: 40.0,
            fan_moderate: 70.0,
            fan_loud: 85.0,
            cooldown_time: Duration::from_secs(60),
        }
    }
}

/// Sensor boundary consumed by the thermal monitor (spec §6). Production
/// code implements this against the real hardware; tests supply a scripted
/// fake, since no real sensor hardware exists in this workspace.
#[async_trait]
pub trait ThermalSensor: Send + Sync {
    async fn read(&self, hardware: HardwareClass) -> Result<ThermalState>;
}
