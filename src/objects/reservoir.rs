//! Reservoir: a fluid container that gates the actuators attached to it.
//!
//! Pumps and valves attach to a reservoir through their container link;
//! the reservoir records each attached owner and, as an
//! [`AdmissionGate`], refuses activation when the fill state would make
//! the actuator's action unsafe (running a pump dry, overfilling a tank).
//!
//! | Role        | Needs        |
//! |-------------|--------------|
//! | `Drains`    | not empty    |
//! | `Submerged` | not empty    |
//! | `Fills`     | not full     |
//! | `Unattached`| nothing      |

use heapless::Vec;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::MAX_OBSERVERS;
use crate::identity::{Identity, Key, ObjectClass, ObjectKind};
use crate::registry::Registry;

use super::AdmissionGate;
use super::actuator::{Actuator, ContainerRole};

/// Fraction of capacity at or below which a reservoir reads as empty.
pub const DEFAULT_EMPTY_FRACTION: f32 = 0.05;
/// Fraction of capacity at or above which a reservoir reads as full.
pub const DEFAULT_FULL_FRACTION: f32 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirData {
    pub id: Identity,
    pub capacity_l: f32,
    #[serde(default)]
    pub volume_l: f32,
}

#[derive(Debug)]
pub struct Reservoir {
    identity: Identity,
    key: Key,
    capacity_l: f32,
    volume_l: f32,
    empty_fraction: f32,
    full_fraction: f32,
    /// Owners currently attached, one entry per attach.
    observers: Vec<Key, MAX_OBSERVERS>,
    config_dirty: bool,
}

impl Reservoir {
    pub fn new(identity: Identity, capacity_l: f32) -> Self {
        debug_assert_eq!(identity.kind.class(), ObjectClass::Reservoir);
        Self {
            identity,
            key: identity.key(),
            capacity_l: capacity_l.max(0.0),
            volume_l: 0.0,
            empty_fraction: DEFAULT_EMPTY_FRACTION,
            full_fraction: DEFAULT_FULL_FRACTION,
            observers: Vec::new(),
            config_dirty: false,
        }
    }

    pub fn from_data(data: &ReservoirData) -> Self {
        let mut reservoir = Self::new(data.id, data.capacity_l);
        reservoir.volume_l = data.volume_l.clamp(0.0, reservoir.capacity_l);
        reservoir
    }

    pub fn to_data(&self) -> ReservoirData {
        ReservoirData {
            id: self.identity,
            capacity_l: self.capacity_l,
            volume_l: self.volume_l,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn capacity_l(&self) -> f32 {
        self.capacity_l
    }

    pub fn volume_l(&self) -> f32 {
        self.volume_l
    }

    /// Record a new volume reading, clamped to `[0, capacity]`.
    pub fn set_volume(&mut self, litres: f32) {
        self.volume_l = litres.clamp(0.0, self.capacity_l);
    }

    pub fn set_capacity(&mut self, litres: f32) {
        let litres = litres.max(0.0);
        if litres != self.capacity_l {
            self.capacity_l = litres;
            self.volume_l = self.volume_l.min(litres);
            self.config_dirty = true;
        }
    }

    pub fn fill_fraction(&self) -> f32 {
        if self.capacity_l > 0.0 {
            self.volume_l / self.capacity_l
        } else {
            0.0
        }
    }

    /// Mains supply never runs dry.
    pub fn is_empty(&self) -> bool {
        match self.identity.kind {
            ObjectKind::MainsWater => false,
            _ => self.fill_fraction() <= self.empty_fraction,
        }
    }

    /// A drain never fills up.
    pub fn is_full(&self) -> bool {
        match self.identity.kind {
            ObjectKind::Drainage => false,
            _ => self.fill_fraction() >= self.full_fraction,
        }
    }

    pub fn observers(&self) -> &[Key] {
        &self.observers
    }

    pub fn take_config_dirty(&mut self) -> bool {
        core::mem::take(&mut self.config_dirty)
    }

    // ── Hooks ─────────────────────────────────────────────────

    pub(crate) fn on_attached(&mut self, owner: Key) {
        if self.observers.push(owner).is_err() {
            warn!("{}: observer list full, {} not tracked", self.identity, owner);
        }
    }

    pub(crate) fn on_detached(&mut self, owner: Key) {
        if let Some(i) = self.observers.iter().position(|k| *k == owner) {
            self.observers.remove(i);
        }
    }

    pub(crate) fn unresolve_any(&mut self, key: Key) {
        self.observers.retain(|k| *k != key);
    }
}

impl AdmissionGate for Reservoir {
    fn can_activate(&self, actuator: &Actuator, _registry: &Registry) -> bool {
        let allowed = match actuator.container_role() {
            ContainerRole::Drains | ContainerRole::Submerged => !self.is_empty(),
            ContainerRole::Fills => !self.is_full(),
            ContainerRole::Unattached => true,
        };
        if !allowed {
            debug!(
                "{}: refusing {} at {:.0}% fill",
                self.identity,
                actuator.identity(),
                self.fill_fraction() * 100.0
            );
        }
        allowed
    }
}
