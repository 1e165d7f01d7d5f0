//! System configuration parameters
//!
//! Runtime tunables for the controller core plus the compile-time capacity
//! limits that size every fixed-capacity collection.
//! Values can be overridden from persisted configuration.

use serde::{Deserialize, Serialize};

use crate::objects::actuator::EnableMode;

/// Maximum number of live objects held by the registry.
pub const MAX_OBJECTS: usize = 32;
/// Maximum outstanding activation handles observed by one actuator.
pub const MAX_HANDLES: usize = 8;
/// Maximum owners a reservoir or rail tracks through attach hooks.
pub const MAX_OBSERVERS: usize = 8;
/// Maximum subscribers per notification signal.
pub const MAX_SUBSCRIBERS: usize = 4;
/// Notifications a signal can hold between flushes.
pub const SIGNAL_QUEUE_CAP: usize = 4;
/// Longest name an attachment keeps for persistence.
pub const MAX_NAME_LEN: usize = 24;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub tick_interval_ms: u32,
    /// Delay between the last configuration change and auto-save (seconds)
    pub autosave_delay_secs: u16,

    // --- Actuators ---
    /// Enable mode given to actuators whose persisted data omits one
    pub default_enable_mode: EnableMode,
    /// Intensity below which an enabled actuator reports itself as idle
    pub enabled_tolerance: f32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,   // 10 Hz
            autosave_delay_secs: 5,

            default_enable_mode: EnableMode::Highest,
            enabled_tolerance: 0.01,
        }
    }
}

impl SystemConfig {
    /// Reject values that would stall the tick loop or mis-report state.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be non-zero");
        }
        if !(0.0..1.0).contains(&self.enabled_tolerance) {
            return Err("enabled_tolerance must be within [0, 1)");
        }
        Ok(())
    }

    /// Seconds per control tick.
    pub fn tick_secs(&self) -> f32 {
        self.tick_interval_ms as f32 / 1000.0
    }
}
