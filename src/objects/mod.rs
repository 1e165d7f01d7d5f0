//! Registered objects and the capabilities they expose to each other.
//!
//! The registry stores one closed [`Object`] enum.  Code that needs a
//! particular capability down-casts through [`ObjectCast`] (e.g. an
//! actuator asking its container link for a [`Reservoir`]) and gets
//! `None` on a kind mismatch instead of a panic.

pub mod actuator;
pub mod handle;
pub mod rail;
pub mod reservoir;

use serde::{Deserialize, Serialize};

use crate::app::ports::OutputFactory;
use crate::error::Error;
use crate::identity::{Identity, Key, ObjectClass};
use crate::registry::Registry;

use actuator::{Actuator, ActuatorData, ActuatorEvent, EnableMode};
use rail::{Rail, RailData};
use reservoir::{Reservoir, ReservoirData};

/// Capability of an object to refuse an actuator's activation.
pub trait AdmissionGate {
    fn can_activate(&self, actuator: &Actuator, registry: &Registry) -> bool;
}

/// Checked down-cast from the registry's [`Object`] enum.
pub trait ObjectCast {
    fn cast(object: &Object) -> Option<&Self>;
    fn cast_mut(object: &mut Object) -> Option<&mut Self>;
}

impl ObjectCast for Actuator {
    fn cast(object: &Object) -> Option<&Self> {
        match object {
            Object::Actuator(a) => Some(a),
            _ => None,
        }
    }

    fn cast_mut(object: &mut Object) -> Option<&mut Self> {
        match object {
            Object::Actuator(a) => Some(a),
            _ => None,
        }
    }
}

impl ObjectCast for Reservoir {
    fn cast(object: &Object) -> Option<&Self> {
        match object {
            Object::Reservoir(r) => Some(r),
            _ => None,
        }
    }

    fn cast_mut(object: &mut Object) -> Option<&mut Self> {
        match object {
            Object::Reservoir(r) => Some(r),
            _ => None,
        }
    }
}

impl ObjectCast for Rail {
    fn cast(object: &Object) -> Option<&Self> {
        match object {
            Object::Rail(r) => Some(r),
            _ => None,
        }
    }

    fn cast_mut(object: &mut Object) -> Option<&mut Self> {
        match object {
            Object::Rail(r) => Some(r),
            _ => None,
        }
    }
}

/// Persisted form of any object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectData {
    Actuator(ActuatorData),
    Reservoir(ReservoirData),
    Rail(RailData),
}

impl ObjectData {
    pub fn identity(&self) -> Identity {
        match self {
            Self::Actuator(d) => d.id,
            Self::Reservoir(d) => d.id,
            Self::Rail(d) => d.id,
        }
    }
}

#[derive(Debug)]
pub enum Object {
    Actuator(Actuator),
    Reservoir(Reservoir),
    Rail(Rail),
}

impl Object {
    /// Rebuild an object from persisted data.  Actuators get their output
    /// from `outputs`.
    pub fn from_data(
        data: &ObjectData,
        outputs: &mut impl OutputFactory,
        default_mode: EnableMode,
    ) -> Result<Self, Error> {
        let expected = match data {
            ObjectData::Actuator(_) => ObjectClass::Actuator,
            ObjectData::Reservoir(_) => ObjectClass::Reservoir,
            ObjectData::Rail(_) => ObjectClass::Rail,
        };
        let id = data.identity();
        if id.kind.class() != expected {
            return Err(Error::Config("object kind does not match its data"));
        }

        Ok(match data {
            ObjectData::Actuator(d) => {
                Self::Actuator(Actuator::from_data(d, outputs.output_for(&id), default_mode))
            }
            ObjectData::Reservoir(d) => Self::Reservoir(Reservoir::from_data(d)),
            ObjectData::Rail(d) => Self::Rail(Rail::from_data(d)),
        })
    }

    pub fn to_data(&self) -> ObjectData {
        match self {
            Self::Actuator(a) => ObjectData::Actuator(a.to_data()),
            Self::Reservoir(r) => ObjectData::Reservoir(r.to_data()),
            Self::Rail(r) => ObjectData::Rail(r.to_data()),
        }
    }

    pub fn identity(&self) -> Identity {
        match self {
            Self::Actuator(a) => a.identity(),
            Self::Reservoir(r) => r.identity(),
            Self::Rail(r) => r.identity(),
        }
    }

    pub fn key(&self) -> Key {
        match self {
            Self::Actuator(a) => a.key(),
            Self::Reservoir(r) => r.key(),
            Self::Rail(r) => r.key(),
        }
    }

    pub fn take_config_dirty(&mut self) -> bool {
        match self {
            Self::Actuator(a) => a.take_config_dirty(),
            Self::Reservoir(r) => r.take_config_dirty(),
            Self::Rail(r) => r.take_config_dirty(),
        }
    }

    /// Per-tick update.  Only actuators have work to do.
    pub(crate) fn update(&mut self, now_ms: u32, registry: &mut Registry) {
        if let Self::Actuator(a) = self {
            a.update(now_ms, registry);
        }
    }

    // ── Attachment hooks ──────────────────────────────────────

    pub(crate) fn on_attached(&mut self, owner: Key) {
        match self {
            Self::Reservoir(r) => r.on_attached(owner),
            Self::Rail(r) => r.on_attached(owner),
            Self::Actuator(_) => {}
        }
    }

    pub(crate) fn on_detached(&mut self, owner: Key) {
        match self {
            Self::Reservoir(r) => r.on_detached(owner),
            Self::Rail(r) => r.on_detached(owner),
            Self::Actuator(_) => {}
        }
    }

    pub(crate) fn unresolve_any(&mut self, key: Key) {
        match self {
            Self::Actuator(a) => a.unresolve_any(key),
            Self::Reservoir(r) => r.unresolve_any(key),
            Self::Rail(r) => r.unresolve_any(key),
        }
    }

    pub(crate) fn teardown(&mut self, registry: &mut Registry) {
        if let Self::Actuator(a) = self {
            a.teardown(registry);
        }
    }

    pub(crate) fn flush_notifications(&mut self, forward: impl FnMut(&ActuatorEvent)) -> usize {
        match self {
            Self::Actuator(a) => a.flush_notifications(forward),
            _ => 0,
        }
    }
}
