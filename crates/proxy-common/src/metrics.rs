//! Component health reporting, used by the core orchestrator to answer
//! "is the proxy itself healthy" independent of any individual backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health levels for a proxy component (Registry, ThermalMonitor, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

impl HealthLevel {
    pub fn as_score(&self) -> u8 {
        match self {
            HealthLevel::Healthy => 100,
            HealthLevel::Degraded => 50,
            HealthLevel::Critical => 10,
            HealthLevel::Unknown => 0,
        }
    }
}

/// Point-in-time health of a single component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthLevel,
    pub message: String,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthLevel::Healthy,
            message: message.into(),
            last_check: Utc::now(),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            status: HealthLevel::Critical,
            message: message.into(),
            last_check: Utc::now(),
        }
    }
}

/// Aggregate health across every named component, rolled up into a single
/// worst-wins `HealthLevel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall: HealthLevel,
    pub components: HashMap<String, ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    pub fn from_components(components: HashMap<String, ComponentHealth>) -> Self {
        let overall = if components.is_empty() {
            HealthLevel::Unknown
        } else if components
            .values()
            .any(|c| c.status == HealthLevel::Critical)
        {
            HealthLevel::Critical
        } else if components
            .values()
            .any(|c| c.status == HealthLevel::Degraded)
        {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };

        Self {
            overall,
            components,
            checked_at: Utc::now(),
        }
    }
}
