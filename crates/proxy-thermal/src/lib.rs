//! Thermal Monitor (C2): continuously produces a `hardware -> ThermalState`
//! map by atomic pointer swap, and tracks the cooldown hysteresis a
//! thermally-critical hardware class must serve before becoming eligible
//! for routing again.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use proxy_common::thermal::{ThermalConfig, ThermalLevel, ThermalSensor, ThermalState};
use proxy_common::types::HardwareClass;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
struct CooldownEntry {
    recovery_since: Option<DateTime<Utc>>,
}

/// Continuously polled thermal state for every tracked hardware class, plus
/// the hysteresis bookkeeping the Router consults before routing to a
/// recently-critical class (spec §4.2 hysteresis; purity resolution in
/// open questions keeps this map outside the Router itself).
pub struct ThermalMonitor {
    sensor: Arc<dyn ThermalSensor>,
    config: ThermalConfig,
    poll_interval: Duration,
    hardware_classes: Vec<HardwareClass>,
    snapshot: ArcSwap<HashMap<HardwareClass, ThermalState>>,
    cooldowns: Mutex<HashMap<HardwareClass, CooldownEntry>>,
}

impl ThermalMonitor {
    pub fn new(
        sensor: Arc<dyn ThermalSensor>,
        config: ThermalConfig,
        poll_interval: Duration,
        hardware_classes: Vec<HardwareClass>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sensor,
            config,
            poll_interval,
            hardware_classes,
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
        })
    }

    /// Read every tracked hardware class once and publish a fully
    /// constructed new map by pointer swap (spec §4.2 concurrency
    /// contract: readers never block writers, writers never block readers).
    /// Returns the hardware classes whose throttling state changed this
    /// poll, computed from `ThermalState::is_throttling` rather than trusted
    /// from the sensor's self-reported flag, for callers that announce
    /// transitions.
    pub async fn poll_once(&self) -> Vec<(HardwareClass, bool)> {
        let previous = self.snapshot.load_full();
        let mut next = HashMap::with_capacity(self.hardware_classes.len());
        let mut crossed = Vec::new();
        for hardware in &self.hardware_classes {
            match self.sensor.read(*hardware).await {
                Ok(state) => {
                    self.update_cooldown(*hardware, &state);
                    let throttling = state.is_throttling(&self.config);
                    let was_throttling = previous.get(hardware).map(|s| s.throttling).unwrap_or(false);
                    if throttling != was_throttling {
                        crossed.push((*hardware, throttling));
                    }
                    next.insert(*hardware, ThermalState { throttling, ..state });
                }
                Err(err) => {
                    warn!(?hardware, error = %err, "thermal sensor read failed, keeping previous state");
                    if let Some(prev) = previous.get(hardware) {
                        next.insert(*hardware, prev.clone());
                    }
                }
            }
        }
        self.snapshot.store(Arc::new(next));
        crossed
    }

    fn update_cooldown(&self, hardware: HardwareClass, state: &ThermalState) {
        let level = state.classify(&self.config);
        let mut cooldowns = self.cooldowns.lock();
        if level >= ThermalLevel::Critical {
            cooldowns.insert(hardware, CooldownEntry { recovery_since: None });
            return;
        }
        if let Some(entry) = cooldowns.get_mut(&hardware) {
            if state.temperature_c < self.config.temp_warning {
                let since = entry.recovery_since.get_or_insert(Utc::now());
                if Utc::now().signed_duration_since(*since).num_milliseconds()
                    >= self.config.cooldown_time.as_millis() as i64
                {
                    debug!(?hardware, "cooldown elapsed, hardware class eligible again");
                    cooldowns.remove(&hardware);
                }
            } else {
                entry.recovery_since = None;
            }
        }
    }

    /// Launches the periodic polling worker. `stop` (dropping the returned
    /// handle after `abort()`) joins it. A standalone convenience for
    /// embedders that want thermal polling running without wiring up
    /// `proxy-core`'s signal bus; `ProxyCore` drives its own ticker instead
    /// so it can publish `ThermalThresholdCrossed` for each flip.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.poll_interval);
            loop {
                ticker.tick().await;
                this.poll_once().await;
            }
        })
    }

    pub fn get(&self, hardware: HardwareClass) -> Option<ThermalState> {
        self.snapshot.load().get(&hardware).cloned()
    }

    pub fn get_all(&self) -> Arc<HashMap<HardwareClass, ThermalState>> {
        self.snapshot.load_full()
    }

    pub fn is_throttling(&self) -> bool {
        self.snapshot.load().values().any(|s| s.throttling)
    }

    /// Whether `hardware` is currently serving its post-critical cooldown.
    pub fn is_in_cooldown(&self, hardware: HardwareClass) -> bool {
        self.cooldowns.lock().contains_key(&hardware)
    }

    /// Snapshot of every hardware class currently in cooldown, passed by
    /// the core into `Router::select` as an explicit parameter so the
    /// router stays a pure function of its inputs.
    pub fn cooldown_snapshot(&self) -> std::collections::HashSet<HardwareClass> {
        self.cooldowns.lock().keys().copied().collect()
    }

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proxy_common::error::Result;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedSensor {
        readings: Vec<f32>,
        call_count: AtomicU32,
    }

    #[async_trait]
    impl ThermalSensor for ScriptedSensor {
        async fn read(&self, _hardware: HardwareClass) -> Result<ThermalState> {
            let i = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
            let temp = self.readings[i.min(self.readings.len() - 1)];
            Ok(ThermalState {
                temperature_c: temp,
                fan_percent: 10.0,
                fan_rpm: None,
                power_draw_w: None,
                utilization_pct: 0.0,
                throttling: false,
                updated_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn snapshot_reflects_latest_poll() {
        let sensor = Arc::new(ScriptedSensor {
            readings: vec![50.0],
            call_count: AtomicU32::new(0),
        });
        let monitor = ThermalMonitor::new(
            sensor,
            ThermalConfig::default(),
            Duration::from_secs(5),
            vec![HardwareClass::Npu],
        );
        monitor.poll_once().await;
        let state = monitor.get(HardwareClass::Npu).unwrap();
        assert_eq!(state.temperature_c, 50.0);
        assert!(!monitor.is_throttling());
    }

    #[tokio::test]
    async fn critical_crossing_enters_cooldown_until_recovered() {
        let sensor = Arc::new(ScriptedSensor {
            readings: vec![95.0, 60.0],
            call_count: AtomicU32::new(0),
        });
        let config = ThermalConfig {
            cooldown_time: Duration::from_millis(0),
            ..ThermalConfig::default()
        };
        let monitor = ThermalMonitor::new(sensor, config, Duration::from_secs(5), vec![HardwareClass::Gpu]);

        monitor.poll_once().await;
        assert!(monitor.is_in_cooldown(HardwareClass::Gpu));

        // Temperature has dropped below warning; with zero cooldown_time
        // the entry clears on the same poll that observes the drop.
        monitor.poll_once().await;
        assert!(!monitor.is_in_cooldown(HardwareClass::Gpu));
    }
}
