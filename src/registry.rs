//! Object registry: the single strong owner of every live object.
//!
//! A fixed-capacity arena of slots.  Each slot carries a generation counter
//! that is bumped whenever the slot is vacated, so an [`ObjectHandle`] taken
//! before a removal can never read the slot's next occupant.
//!
//! ```text
//!   Key ──lookup──▶ ObjectHandle{index, generation} ──get──▶ &Object
//!                                   │
//!                     slot vacated ─┴─▶ generation + 1 (old handles fail)
//! ```
//!
//! ## Check-out
//!
//! During a tick the service *checks out* one object at a time so its
//! update can hold `&mut Object` and `&mut Registry` together.  A checked-out
//! slot keeps its key (it is still registered) but `get` returns `None`
//! until the object is checked back in.
//!
//! ## Removal
//!
//! [`Registry::unregister`] runs the full teardown protocol: the removed
//! object detaches its own attachments and invalidates anything it hands
//! out, then every remaining object is told to `unresolve_any(key)` so no
//! attachment is left resolved to the departed key.

use heapless::Vec;
use log::{info, warn};

use crate::config::MAX_OBJECTS;
use crate::error::RegistryError;
use crate::identity::{Identity, Key, ObjectKind};
use crate::objects::{Object, ObjectCast};

/// Generation-checked reference into the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u16,
    generation: u16,
}

#[derive(Debug)]
enum SlotState {
    Vacant,
    Occupied(Object),
    CheckedOut,
}

#[derive(Debug)]
struct Slot {
    key: Key,
    generation: u16,
    state: SlotState,
}

impl Slot {
    fn is_live(&self) -> bool {
        !matches!(self.state, SlotState::Vacant)
    }
}

/// Key → object map with at most one live object per key.
#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Slot, MAX_OBJECTS>,
}

impl Registry {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Number of registered objects (checked-out objects included).
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Registration ──────────────────────────────────────────

    /// Insert an object under its own key.
    ///
    /// Fails if the key is already present or every slot is occupied.
    pub fn register(&mut self, object: Object) -> Result<ObjectHandle, RegistryError> {
        let key = object.key();
        if self.lookup(key).is_some() {
            return Err(RegistryError::DuplicateKey(key));
        }

        let index = match self.slots.iter().position(|s| !s.is_live()) {
            Some(i) => i,
            None => {
                let slot = Slot {
                    key,
                    generation: 0,
                    state: SlotState::Vacant,
                };
                self.slots.push(slot).map_err(|_| RegistryError::Full)?;
                self.slots.len() - 1
            }
        };

        info!("Registry: registered {} ({}) at slot {}", object.identity(), key, index);
        let slot = &mut self.slots[index];
        slot.key = key;
        slot.state = SlotState::Occupied(object);
        Ok(ObjectHandle {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// Remove the object registered under `key` and return it.
    ///
    /// Returns `None` if nothing is registered under `key` or the object is
    /// currently checked out.
    pub fn unregister(&mut self, key: Key) -> Option<Object> {
        let index = self.slots.iter().position(|s| s.is_live() && s.key == key)?;
        let slot = &mut self.slots[index];
        if matches!(slot.state, SlotState::CheckedOut) {
            warn!("Registry: cannot remove {} while it is checked out", key);
            return None;
        }

        let SlotState::Occupied(mut object) = core::mem::replace(&mut slot.state, SlotState::Vacant)
        else {
            return None;
        };
        slot.generation = slot.generation.wrapping_add(1);

        object.teardown(self);
        for slot in self.slots.iter_mut() {
            if let SlotState::Occupied(other) = &mut slot.state {
                other.unresolve_any(key);
            }
        }

        info!("Registry: removed {} ({})", object.identity(), key);
        Some(object)
    }

    /// Find a free identity for `kind`, starting at `preferred`.
    ///
    /// On collision, warns and searches upward for the next index whose key
    /// is not registered.
    pub fn allocate_identity(&self, kind: ObjectKind, preferred: u8) -> Option<Identity> {
        let candidate = Identity::new(kind, preferred);
        if !self.contains(candidate.key()) {
            return Some(candidate);
        }

        warn!("Registry: key for {} already taken, searching for a free index", candidate);
        (preferred.checked_add(1)?..=u8::MAX)
            .map(|i| Identity::new(kind, i))
            .find(|id| !self.contains(id.key()))
    }

    // ── Lookup ────────────────────────────────────────────────

    /// Handle of the object registered under `key`, if any.
    pub fn lookup(&self, key: Key) -> Option<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_live() && s.key == key)
            .map(|(i, s)| ObjectHandle {
                index: i as u16,
                generation: s.generation,
            })
    }

    pub fn contains(&self, key: Key) -> bool {
        self.lookup(key).is_some()
    }

    /// Whether `handle` still refers to a registered object.
    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Key of the object `handle` refers to.
    pub fn key_of(&self, handle: ObjectHandle) -> Option<Key> {
        self.slot(handle).map(|s| s.key)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&Object> {
        match &self.slot(handle)?.state {
            SlotState::Occupied(object) => Some(object),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        match &mut slot.state {
            SlotState::Occupied(object) => Some(object),
            _ => None,
        }
    }

    pub fn get_by_key(&self, key: Key) -> Option<&Object> {
        self.get(self.lookup(key)?)
    }

    pub fn get_by_key_mut(&mut self, key: Key) -> Option<&mut Object> {
        let handle = self.lookup(key)?;
        self.get_mut(handle)
    }

    /// Typed lookup, e.g. `registry.get_as::<Reservoir>(key)`.
    pub fn get_as<T: ObjectCast>(&self, key: Key) -> Option<&T> {
        self.get_by_key(key).and_then(T::cast)
    }

    pub fn get_as_mut<T: ObjectCast>(&mut self, key: Key) -> Option<&mut T> {
        self.get_by_key_mut(key).and_then(T::cast_mut)
    }

    /// Keys of every registered object, in slot order.
    pub fn keys(&self) -> Vec<Key, MAX_OBJECTS> {
        self.slots
            .iter()
            .filter(|s| s.is_live())
            .map(|s| s.key)
            .collect()
    }

    /// Every object not currently checked out, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.slots.iter().filter_map(|s| match &s.state {
            SlotState::Occupied(object) => Some(object),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.slots.iter_mut().filter_map(|s| match &mut s.state {
            SlotState::Occupied(object) => Some(object),
            _ => None,
        })
    }

    // ── Check-out ─────────────────────────────────────────────

    /// Run `f` with the object under `key` checked out of the registry.
    ///
    /// Returns `None` if no such object is present (or it is already
    /// checked out).
    pub fn with_object<R>(
        &mut self,
        key: Key,
        f: impl FnOnce(&mut Object, &mut Registry) -> R,
    ) -> Option<R> {
        let handle = self.lookup(key)?;
        let slot = &mut self.slots[handle.index as usize];
        let SlotState::Occupied(mut object) = core::mem::replace(&mut slot.state, SlotState::CheckedOut)
        else {
            return None;
        };

        let result = f(&mut object, self);

        self.slots[handle.index as usize].state = SlotState::Occupied(object);
        Some(result)
    }

    // ── Internal ──────────────────────────────────────────────

    fn slot(&self, handle: ObjectHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.is_live())
    }
}
