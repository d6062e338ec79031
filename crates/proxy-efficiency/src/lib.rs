//! Efficiency Manager (C3): holds the user-selected mode, resolves Auto to
//! a concrete mode from the current system state, and rewrites request
//! annotations so the Router's scoring reflects mode intent.

use parking_lot::Mutex;
use proxy_common::efficiency::{mode_config, EfficiencyMode, ModeConfig, SystemState};
use proxy_common::types::Annotations;

struct Inner {
    mode: EfficiencyMode,
    system_state: SystemState,
}

/// `GetMode`/`SetMode`/`SystemState` share a single mutex (spec §5
/// concurrency contract): every read or write is O(1), so holding it for
/// the duration of `apply_to_annotations` never blocks for long.
pub struct EfficiencyManager {
    inner: Mutex<Inner>,
}

impl EfficiencyManager {
    pub fn new(mode: EfficiencyMode, system_state: SystemState) -> Self {
        Self {
            inner: Mutex::new(Inner { mode, system_state }),
        }
    }

    pub fn mode(&self) -> EfficiencyMode {
        self.inner.lock().mode
    }

    pub fn set_mode(&self, mode: EfficiencyMode) {
        self.inner.lock().mode = mode;
    }

    pub fn system_state(&self) -> SystemState {
        self.inner.lock().system_state
    }

    pub fn set_system_state(&self, state: SystemState) {
        self.inner.lock().system_state = state;
    }

    /// `GetMode()` unless it is `Auto`, in which case this is a pure
    /// function of the current `SystemState` (invariant 6).
    pub fn effective_mode(&self) -> EfficiencyMode {
        let inner = self.inner.lock();
        if inner.mode == EfficiencyMode::Auto {
            resolve_auto(&inner.system_state)
        } else {
            inner.mode
        }
    }

    pub fn effective_mode_config(&self) -> ModeConfig {
        mode_config(self.effective_mode())
    }

    /// Rewrite `annotations` in place to reflect the effective mode's power
    /// and latency intent (spec §4.3).
    pub fn apply_to_annotations(&self, annotations: &mut Annotations) {
        let effective = self.effective_mode();
        let config = mode_config(effective);

        if let Some(max) = config.max_power_watts {
            annotations.max_power_watts = if annotations.max_power_watts == 0.0 {
                max
            } else {
                annotations.max_power_watts.min(max)
            };
        }

        let is_efficiency_leaning = matches!(
            effective,
            EfficiencyMode::Efficiency | EfficiencyMode::Quiet | EfficiencyMode::UltraEfficiency
        );
        if is_efficiency_leaning {
            annotations.prefer_power_efficiency = true;
            if config.throttle_latency_critical {
                annotations.latency_critical = false;
            }
        }
    }

    /// Per-mode thermal/noise gate: excludes a backend whose hardware class
    /// is currently too hot or too loud for the effective mode, before the
    /// Router even scores it.
    pub fn should_use_backend(&self, temp_c: f32, fan_pct: f32) -> bool {
        let config = self.effective_mode_config();
        temp_c <= config.max_temperature_c && fan_pct <= config.max_fan_percent
    }
}

/// Auto resolution: first matching rule wins (spec §4.3, load-bearing for
/// tests — rule order must not change).
pub fn resolve_auto(state: &SystemState) -> EfficiencyMode {
    if state.on_battery && state.battery_percent < 20.0 {
        return EfficiencyMode::UltraEfficiency;
    }
    if state.on_battery && state.battery_percent < 50.0 {
        return EfficiencyMode::Efficiency;
    }
    if state.quiet_hours {
        return EfficiencyMode::Quiet;
    }
    if state.avg_temp_c > 75.0 {
        return EfficiencyMode::Efficiency;
    }
    if state.avg_fan_pct > 70.0 {
        return EfficiencyMode::Quiet;
    }
    if state.on_battery {
        return EfficiencyMode::Balanced;
    }
    EfficiencyMode::Performance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(battery: f32, on_battery: bool, temp: f32, fan: f32, quiet: bool) -> SystemState {
        SystemState {
            battery_percent: battery,
            on_battery,
            avg_temp_c: temp,
            avg_fan_pct: fan,
            quiet_hours: quiet,
        }
    }

    #[test]
    fn auto_resolves_low_battery_to_ultra_efficiency() {
        let s = state(15.0, true, 60.0, 30.0, false);
        assert_eq!(resolve_auto(&s), EfficiencyMode::UltraEfficiency);
    }

    #[test]
    fn auto_resolves_moderate_battery_to_efficiency() {
        let s = state(35.0, true, 60.0, 30.0, false);
        assert_eq!(resolve_auto(&s), EfficiencyMode::Efficiency);
    }

    #[test]
    fn auto_resolves_quiet_hours_before_thermal_checks() {
        // Quiet hours wins even though avg_temp alone would resolve to Efficiency.
        let s = state(90.0, false, 80.0, 10.0, true);
        assert_eq!(resolve_auto(&s), EfficiencyMode::Quiet);
    }

    #[test]
    fn auto_resolves_hot_system_to_efficiency() {
        let s = state(90.0, false, 80.0, 10.0, false);
        assert_eq!(resolve_auto(&s), EfficiencyMode::Efficiency);
    }

    #[test]
    fn auto_resolves_loud_fan_to_quiet() {
        let s = state(90.0, false, 60.0, 75.0, false);
        assert_eq!(resolve_auto(&s), EfficiencyMode::Quiet);
    }

    #[test]
    fn auto_resolves_plugged_in_idle_to_performance() {
        let s = state(90.0, false, 60.0, 10.0, false);
        assert_eq!(resolve_auto(&s), EfficiencyMode::Performance);
    }

    #[test]
    fn auto_resolves_plugged_in_battery_remaining_to_balanced() {
        let s = state(90.0, true, 60.0, 10.0, false);
        assert_eq!(resolve_auto(&s), EfficiencyMode::Balanced);
    }

    #[test]
    fn apply_to_annotations_sets_power_preference_in_efficiency_modes() {
        let manager = EfficiencyManager::new(
            EfficiencyMode::UltraEfficiency,
            state(90.0, false, 60.0, 10.0, false),
        );
        let mut annotations = Annotations {
            latency_critical: true,
            ..Annotations::default()
        };
        manager.apply_to_annotations(&mut annotations);

        assert!(annotations.prefer_power_efficiency);
        assert!(!annotations.latency_critical);
        assert_eq!(annotations.max_power_watts, 5.0);
    }

    #[test]
    fn apply_to_annotations_takes_tighter_of_existing_and_mode_limit() {
        let manager = EfficiencyManager::new(
            EfficiencyMode::Balanced,
            state(90.0, false, 60.0, 10.0, false),
        );
        let mut annotations = Annotations {
            max_power_watts: 30.0,
            ..Annotations::default()
        };
        manager.apply_to_annotations(&mut annotations);
        assert_eq!(annotations.max_power_watts, 30.0);
    }

    #[test]
    fn effective_mode_is_deterministic_pure_function_of_state() {
        let manager = EfficiencyManager::new(EfficiencyMode::Auto, state(15.0, true, 60.0, 30.0, false));
        assert_eq!(manager.effective_mode(), EfficiencyMode::UltraEfficiency);
        assert_eq!(manager.effective_mode(), EfficiencyMode::UltraEfficiency);
    }
}
