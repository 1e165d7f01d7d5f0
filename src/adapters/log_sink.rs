//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (which goes to UART / USB-CDC in production).
//! A future MQTT or display adapter would implement the same trait.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Activated { key, intensity } => {
                info!("ACT   | {} on at {:.0}%", key, intensity * 100.0);
            }
            AppEvent::Deactivated { key } => {
                info!("ACT   | {} off", key);
            }
            AppEvent::ObjectAdded(id) => {
                info!("OBJ   | + {} ({})", id, id.key());
            }
            AppEvent::ObjectRemoved(id) => {
                info!("OBJ   | - {} ({})", id, id.key());
            }
            AppEvent::ConfigSaved { objects } => {
                info!("CFG   | saved {} objects", objects);
            }
            AppEvent::Restored { objects } => {
                info!("CFG   | restored {} objects", objects);
            }
        }
    }
}
