//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (serial console,
//! MQTT, a schedule) that the [`AppService`](super::service::AppService)
//! interprets and acts upon.  Activation requests are not commands: they
//! return a handle the caller must keep, so they go through
//! [`AppService::enable`](super::service::AppService::enable) directly.

use crate::config::SystemConfig;
use crate::identity::{Key, KeyString};
use crate::objects::actuator::EnableMode;

/// Which link of an actuator a [`AppCommand::Link`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSlot {
    Container,
    Rail,
}

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Change how an actuator reconciles concurrent requests.
    SetEnableMode { key: Key, mode: EnableMode },

    /// Point an actuator link at a key string; empty clears the link.
    Link {
        key: Key,
        slot: LinkSlot,
        target: KeyString,
    },

    /// Record a reservoir volume reading.
    SetVolume { key: Key, litres: f32 },

    /// Remove an object from the registry.
    Remove(Key),

    /// Hot-reload configuration.
    UpdateConfig(SystemConfig),

    /// Explicitly persist the current objects on the next auto-save check.
    SaveConfig,
}
