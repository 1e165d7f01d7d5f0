//! Power rail: a shared supply with a limited budget.
//!
//! Every actuator whose rail link resolves here is recorded as a load.
//! Before an actuator may switch on, the rail checks its budget against
//! every enabled actuator linked to it.  The budget is computed from the
//! registry, so it holds even when the load list has overflowed.

use heapless::Vec;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::MAX_OBSERVERS;
use crate::identity::{Identity, Key, ObjectClass};
use crate::registry::Registry;

use super::actuator::Actuator;
use super::{AdmissionGate, Object};

/// Budget a rail enforces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RailLimit {
    /// At most `max_active` loads enabled at once.
    Simple { max_active: u8 },
    /// Total nameplate power of enabled loads may not exceed `max_watts`.
    Regulated { max_watts: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RailData {
    pub id: Identity,
    pub limit: RailLimit,
}

#[derive(Debug)]
pub struct Rail {
    identity: Identity,
    key: Key,
    limit: RailLimit,
    loads: Vec<Key, MAX_OBSERVERS>,
    config_dirty: bool,
}

impl Rail {
    pub fn new(identity: Identity, limit: RailLimit) -> Self {
        debug_assert_eq!(identity.kind.class(), ObjectClass::Rail);
        Self {
            identity,
            key: identity.key(),
            limit,
            loads: Vec::new(),
            config_dirty: false,
        }
    }

    pub fn from_data(data: &RailData) -> Self {
        Self::new(data.id, data.limit)
    }

    pub fn to_data(&self) -> RailData {
        RailData {
            id: self.identity,
            limit: self.limit,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn limit(&self) -> RailLimit {
        self.limit
    }

    pub fn set_limit(&mut self, limit: RailLimit) {
        if limit != self.limit {
            self.limit = limit;
            self.config_dirty = true;
        }
    }

    /// Actuators attached to this rail, one entry per attach.  Capped at
    /// `MAX_OBSERVERS`; budget checks do not depend on it.
    pub fn loads(&self) -> &[Key] {
        &self.loads
    }

    /// Enabled actuators linked to this rail other than `except`, with
    /// their summed power draw.
    pub fn active_loads(&self, registry: &Registry, except: Key) -> (u8, f32) {
        registry
            .iter()
            .filter_map(|obj| match obj {
                Object::Actuator(a) => Some(a),
                _ => None,
            })
            .filter(|a| a.key() != except && a.enabled() && a.rail().key() == Some(self.key))
            .fold((0u8, 0.0), |(count, watts), a| {
                (count.saturating_add(1), watts + a.power_draw_watts())
            })
    }

    pub fn take_config_dirty(&mut self) -> bool {
        core::mem::take(&mut self.config_dirty)
    }

    // ── Hooks ─────────────────────────────────────────────────

    pub(crate) fn on_attached(&mut self, owner: Key) {
        if self.loads.push(owner).is_err() {
            warn!("{}: load list full, {} not tracked", self.identity, owner);
        }
    }

    pub(crate) fn on_detached(&mut self, owner: Key) {
        if let Some(i) = self.loads.iter().position(|k| *k == owner) {
            self.loads.remove(i);
        }
    }

    pub(crate) fn unresolve_any(&mut self, key: Key) {
        self.loads.retain(|k| *k != key);
    }
}

impl AdmissionGate for Rail {
    fn can_activate(&self, actuator: &Actuator, registry: &Registry) -> bool {
        let (count, watts) = self.active_loads(registry, actuator.key());
        let allowed = match self.limit {
            RailLimit::Simple { max_active } => count < max_active,
            RailLimit::Regulated { max_watts } => watts + actuator.power_draw_watts() <= max_watts,
        };
        if !allowed {
            debug!(
                "{}: no budget for {} ({} active, {:.0} W)",
                self.identity,
                actuator.identity(),
                count,
                watts
            );
        }
        allowed
    }
}
