//! Broadcast signals the core publishes when observable state changes,
//! so an embedding process can react (metrics, logging, UI) without
//! polling the core on every tick.

use proxy_common::efficiency::EfficiencyMode;
use proxy_common::types::{BackendId, HardwareClass};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Signal {
    ModeChanged {
        previous: EfficiencyMode,
        current: EfficiencyMode,
    },
    BackendStatusChanged {
        backend_id: BackendId,
        healthy: bool,
    },
    ThermalThresholdCrossed {
        hardware: HardwareClass,
        throttling: bool,
    },
}

/// Default channel capacity: generous enough that a slow subscriber
/// doesn't force the publisher to block, per the core's non-suspending
/// publish contract.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub fn channel() -> (broadcast::Sender<Signal>, broadcast::Receiver<Signal>) {
    broadcast::channel(DEFAULT_CHANNEL_CAPACITY)
}
