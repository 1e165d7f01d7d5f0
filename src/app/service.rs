//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the object registry and the live configuration.
//! It exposes a clean, hardware-agnostic API.  Outputs are injected into
//! actuators at construction; events and storage flow through port
//! traits passed at call sites, making the entire service testable with
//! mock adapters.
//!
//! ```text
//!                 ┌──────────────────────────┐ ──▶ EventSink
//!   enable() ───▶ │        AppService         │
//!                 │  Registry · tick · save   │ ◀─▶ ConfigPort
//!  OutputPort ◀── │  (actuators drive ports)  │
//!                 └──────────────────────────┘
//! ```
//!
//! ## Tick
//!
//! 1. Every registered object is checked out in slot order and updated.
//! 2. Per-object configuration changes are folded into the service's
//!    dirty flag.
//! 3. Queued notifications are flushed to subscribers and the sink.

use anyhow::Context;
use log::{info, warn};

use crate::attachment::AttachTarget;
use crate::config::SystemConfig;
use crate::error::{Error, RegistryError};
use crate::identity::Key;
use crate::objects::actuator::{Actuator, ActuatorEvent, EnableMode};
use crate::objects::handle::ActivationHandle;
use crate::objects::reservoir::Reservoir;
use crate::objects::{Object, ObjectCast, ObjectData};
use crate::registry::{ObjectHandle, Registry};
use crate::signal::SubscriptionId;

use super::commands::{AppCommand, LinkSlot};
use super::events::AppEvent;
use super::ports::{ConfigError, ConfigPort, EventSink, OutputFactory};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    config: SystemConfig,
    registry: Registry,
    /// Seconds per control tick (derived from config).
    tick_secs: f32,
    tick_count: u64,
    now_ms: u32,
    config_dirty: bool,
    dirty_since_tick: u64,
    /// Explicit save request; skips the auto-save delay.
    save_requested: bool,
}

impl AppService {
    /// Construct an empty service.  An invalid configuration is replaced
    /// by the defaults.
    pub fn new(config: SystemConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Invalid configuration ({}), using defaults", e);
                SystemConfig::default()
            }
        };
        Self {
            tick_secs: config.tick_secs(),
            config,
            registry: Registry::new(),
            tick_count: 0,
            now_ms: 0,
            config_dirty: false,
            dirty_since_tick: 0,
            save_requested: false,
        }
    }

    // ── Object lifecycle ──────────────────────────────────────

    /// Register an object.  Its links resolve on the next tick.
    pub fn add(&mut self, object: Object, sink: &mut impl EventSink) -> Result<ObjectHandle, Error> {
        let identity = object.identity();
        let handle = self.registry.register(object)?;
        self.mark_config_dirty();
        sink.emit(&AppEvent::ObjectAdded(identity));
        Ok(handle)
    }

    /// Remove an object.  Every link resolved to it falls back to
    /// unresolved and every handle it issued becomes invalid.  An actuator
    /// that was running reports its deactivation before the removal.
    pub fn remove(&mut self, key: Key, sink: &mut impl EventSink) -> Result<Object, Error> {
        let mut object = self
            .registry
            .unregister(key)
            .ok_or(RegistryError::NotFound(key))?;
        object.flush_notifications(|event| sink.emit(&AppEvent::from(*event)));
        self.mark_config_dirty();
        sink.emit(&AppEvent::ObjectRemoved(object.identity()));
        Ok(object)
    }

    // ── Requests ──────────────────────────────────────────────

    /// Request activation of the actuator under `key`.
    pub fn enable(&mut self, key: Key, intensity: f32, duration_ms: Option<u32>) -> Result<ActivationHandle, Error> {
        Ok(self
            .object_mut::<Actuator>(key)?
            .try_enable(intensity, duration_ms, false)?)
    }

    /// Request activation that bypasses the actuator's admission gates.
    pub fn enable_forced(&mut self, key: Key, intensity: f32, duration_ms: Option<u32>) -> Result<ActivationHandle, Error> {
        Ok(self
            .object_mut::<Actuator>(key)?
            .try_enable(intensity, duration_ms, true)?)
    }

    /// Pump a volume through the actuator under `key`.  The handle is
    /// invalid if the pump has no resolved container or flow rate.
    pub fn pump_volume(&mut self, key: Key, litres: f32) -> Result<ActivationHandle, Error> {
        Ok(self.object_mut::<Actuator>(key)?.pump_volume(litres))
    }

    /// Subscribe to activation edges of the actuator under `key`.
    /// `Ok(None)` means its subscriber list is full.
    pub fn subscribe(
        &mut self,
        key: Key,
        callback: impl FnMut(&ActuatorEvent) + 'static,
    ) -> Result<Option<SubscriptionId>, Error> {
        Ok(self.object_mut::<Actuator>(key)?.subscribe(callback))
    }

    // ── Configuration of objects ──────────────────────────────

    pub fn set_enable_mode(&mut self, key: Key, mode: EnableMode) -> Result<(), Error> {
        self.object_mut::<Actuator>(key)?.set_enable_mode(mode);
        Ok(())
    }

    /// Point one of an actuator's links at `target`.  Returns whether the
    /// link changed.
    pub fn link<'a>(&mut self, key: Key, slot: LinkSlot, target: impl Into<AttachTarget<'a>>) -> Result<bool, Error> {
        let target = target.into();
        let changed = self
            .registry
            .with_object(key, |object, registry| match object {
                Object::Actuator(a) => Ok(match slot {
                    LinkSlot::Container => a.set_container(target, registry),
                    LinkSlot::Rail => a.set_rail(target, registry),
                }),
                _ => Err(RegistryError::WrongKind(key)),
            })
            .ok_or(RegistryError::NotFound(key))??;
        if changed {
            self.mark_config_dirty();
        }
        Ok(changed)
    }

    /// Record a volume reading for the reservoir under `key`.
    pub fn set_reservoir_volume(&mut self, key: Key, litres: f32) -> Result<(), Error> {
        self.object_mut::<Reservoir>(key)?.set_volume(litres);
        Ok(())
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle at monotonic time `now_ms`.
    pub fn tick(&mut self, now_ms: u32, sink: &mut impl EventSink) {
        self.tick_count += 1;
        self.now_ms = now_ms;

        // 1. Update every object with the registry checked in around it
        for key in self.registry.keys() {
            self.registry
                .with_object(key, |object, registry| object.update(now_ms, registry));
        }

        // 2. Fold per-object config changes into the service flag
        let mut dirty = false;
        for object in self.registry.iter_mut() {
            dirty |= object.take_config_dirty();
        }
        if dirty {
            self.mark_config_dirty();
        }

        // 3. Deliver notifications queued during the updates
        for object in self.registry.iter_mut() {
            object.flush_notifications(|event| sink.emit(&AppEvent::from(*event)));
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command (serial, MQTT, schedule, etc.).
    pub fn handle_command(&mut self, cmd: AppCommand, sink: &mut impl EventSink) -> Result<(), Error> {
        match cmd {
            AppCommand::SetEnableMode { key, mode } => self.set_enable_mode(key, mode),
            AppCommand::Link { key, slot, target } => self.link(key, slot, target.as_str()).map(drop),
            AppCommand::SetVolume { key, litres } => self.set_reservoir_volume(key, litres),
            AppCommand::Remove(key) => self.remove(key, sink).map(drop),
            AppCommand::UpdateConfig(new_config) => {
                new_config.validate().map_err(Error::Config)?;
                self.tick_secs = new_config.tick_secs();
                self.config = new_config;
                info!("Configuration updated at runtime");
                Ok(())
            }
            AppCommand::SaveConfig => {
                self.mark_config_dirty();
                self.save_requested = true;
                info!("Explicit config save requested (will flush on next auto-save check)");
                Ok(())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn actuator(&self, key: Key) -> Result<&Actuator, Error> {
        self.object::<Actuator>(key)
    }

    pub fn reservoir(&self, key: Key) -> Result<&Reservoir, Error> {
        self.object::<Reservoir>(key)
    }

    /// Whether the actuator under `key` is on above the configured
    /// tolerance.  Unknown keys read as off.
    pub fn is_enabled(&self, key: Key) -> bool {
        self.actuator(key)
            .is_ok_and(|a| a.is_enabled(self.config.enabled_tolerance))
    }

    /// Persistable form of every registered object, in slot order.
    pub fn snapshot(&self) -> Vec<ObjectData> {
        self.registry.iter().map(Object::to_data).collect()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Time passed to the latest tick.
    pub fn now_ms(&self) -> u32 {
        self.now_ms
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    // ── Persistence ───────────────────────────────────────────

    /// Rebuild objects from `store`.  Returns how many were registered.
    ///
    /// First boot (nothing stored) restores zero objects.  Duplicate keys
    /// in the stored list are skipped with a warning.
    pub fn restore(
        &mut self,
        store: &impl ConfigPort,
        outputs: &mut impl OutputFactory,
        sink: &mut impl EventSink,
    ) -> anyhow::Result<usize> {
        let stored = match store.load() {
            Ok(stored) => stored,
            Err(ConfigError::NotFound) => {
                info!("No stored configuration, starting empty");
                return Ok(0);
            }
            Err(e) => return Err(e).context("loading object configuration"),
        };

        let mut restored = 0;
        for data in &stored {
            let object = Object::from_data(data, &mut *outputs, self.config.default_enable_mode)
                .with_context(|| format!("rebuilding {}", data.identity()))?;
            match self.registry.register(object) {
                Ok(_) => restored += 1,
                Err(RegistryError::DuplicateKey(key)) => {
                    warn!("Skipping stored duplicate of {} ({})", data.identity(), key);
                }
                Err(e) => {
                    return Err(Error::from(e))
                        .with_context(|| format!("registering {}", data.identity()));
                }
            }
        }

        info!("Restored {} of {} stored objects", restored, stored.len());
        sink.emit(&AppEvent::Restored { objects: restored });
        Ok(restored)
    }

    // ── Config dirty-flag management ──────────────────────────

    /// Mark the configuration as modified.
    pub fn mark_config_dirty(&mut self) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_tick = self.tick_count;
        }
    }

    /// Save once the configured delay has passed since the first unsaved
    /// change.  Returns `true` if the objects were saved.
    pub fn auto_save_if_needed(&mut self, store: &mut impl ConfigPort, sink: &mut impl EventSink) -> bool {
        if !self.config_dirty {
            return false;
        }
        let ticks_since_dirty = self.tick_count.saturating_sub(self.dirty_since_tick);
        let secs_since_dirty = ticks_since_dirty as f32 * self.tick_secs;
        if !self.save_requested && secs_since_dirty < f32::from(self.config.autosave_delay_secs) {
            return false;
        }
        self.save(store, sink, "auto-saved")
    }

    /// Force-save if dirty (call before shutdown).
    pub fn force_save_if_dirty(&mut self, store: &mut impl ConfigPort, sink: &mut impl EventSink) {
        if self.config_dirty {
            self.save(store, sink, "force-saved");
        }
    }

    /// Whether the configuration has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }

    // ── Internal ──────────────────────────────────────────────

    fn save(&mut self, store: &mut impl ConfigPort, sink: &mut impl EventSink, how: &str) -> bool {
        let objects = self.snapshot();
        match store.save(&objects) {
            Ok(()) => {
                self.config_dirty = false;
                self.save_requested = false;
                info!("Config {} ({} objects)", how, objects.len());
                sink.emit(&AppEvent::ConfigSaved {
                    objects: objects.len(),
                });
                true
            }
            Err(e) => {
                warn!("Config save failed: {}", e);
                false
            }
        }
    }

    fn object<T: ObjectCast>(&self, key: Key) -> Result<&T, Error> {
        let object = self.registry.get_by_key(key).ok_or_else(|| not_found(key))?;
        T::cast(object).ok_or(Error::Registry(RegistryError::WrongKind(key)))
    }

    fn object_mut<T: ObjectCast>(&mut self, key: Key) -> Result<&mut T, Error> {
        let object = self.registry.get_by_key_mut(key).ok_or_else(|| not_found(key))?;
        T::cast_mut(object).ok_or(Error::Registry(RegistryError::WrongKind(key)))
    }
}

fn not_found(key: Key) -> Error {
    warn!("AppService: no object registered under {}", key);
    RegistryError::NotFound(key).into()
}
