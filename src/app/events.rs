//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, publish over MQTT,
//! update a display.

use crate::identity::{Identity, Key};
use crate::objects::actuator::ActuatorEvent;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// An actuator switched on.
    Activated { key: Key, intensity: f32 },

    /// An actuator switched off.
    Deactivated { key: Key },

    /// An object joined the registry.
    ObjectAdded(Identity),

    /// An object left the registry.
    ObjectRemoved(Identity),

    /// The object configuration was persisted.
    ConfigSaved { objects: usize },

    /// Objects were rebuilt from persisted configuration.
    Restored { objects: usize },
}

impl From<ActuatorEvent> for AppEvent {
    fn from(event: ActuatorEvent) -> Self {
        match event {
            ActuatorEvent::Activated { key, intensity } => Self::Activated { key, intensity },
            ActuatorEvent::Deactivated { key } => Self::Deactivated { key },
        }
    }
}
