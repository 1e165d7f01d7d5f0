//! Actuator: a contended physical output and its arbitration engine.
//!
//! Any number of callers may hold [`ActivationHandle`]s against one
//! actuator.  Once per tick the actuator reconciles them into a single
//! drive command:
//!
//! ```text
//!   handles ──GC──▶ survivors ──admission──▶ can_enable?
//!                                   │             │
//!               container + rail gates       no ──┴──▶ disable (notify on edge)
//!                                                yes ─▶ combine per EnableMode
//!                                                        ─▶ clamp ─▶ OutputPort
//!                                                        ─▶ notify on edge
//! ```
//!
//! ## Time accounting
//!
//! Handle durations only run down while the handle is actually driving:
//! in serial modes only the selected handle accrues time, in parallel
//! modes every active handle does, and nothing accrues while the actuator
//! is disabled (e.g. held back by an empty reservoir).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use heapless::Vec;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::OutputPort;
use crate::attachment::{AttachTarget, Attachment};
use crate::config::MAX_HANDLES;
use crate::error::ActuatorError;
use crate::identity::{Identity, Key, KeyString, ObjectClass, ObjectKind};
use crate::registry::Registry;
use crate::signal::{Signal, SubscriptionId};

use super::handle::{Activation, ActivationHandle, HandleState, SharedActivation, WeakActivation};
use super::rail::Rail;
use super::reservoir::Reservoir;
use super::{AdmissionGate, ObjectCast};

// ---------------------------------------------------------------------------
// Policy types
// ---------------------------------------------------------------------------

/// How concurrently valid handles are reconciled into one intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnableMode {
    /// Maximum intensity of all handles.
    #[default]
    Highest,
    /// Minimum intensity of all handles.
    Lowest,
    /// Mean intensity of all handles.
    Average,
    /// Product of all intensities.
    Multiply,
    /// First handle in insertion order drives alone.
    InOrder,
    /// Last handle in insertion order drives alone.
    RevOrder,
    /// Lowest-intensity handle drives alone (first match front-to-back).
    AscOrder,
    /// Highest-intensity handle drives alone (first match back-to-front).
    DescOrder,
}

impl EnableMode {
    /// Serial modes select exactly one handle; parallel modes combine all.
    pub fn is_serial(self) -> bool {
        matches!(
            self,
            Self::InOrder | Self::RevOrder | Self::AscOrder | Self::DescOrder
        )
    }
}

/// Valid drive range of the physical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputRange {
    /// `[0, 1]`: relays, lights and single-direction pumps.
    #[default]
    Unipolar,
    /// `[-1, 1]`: reversible motors.
    Bipolar,
}

impl OutputRange {
    pub fn clamp(self, intensity: f32) -> f32 {
        match self {
            Self::Unipolar => intensity.clamp(0.0, 1.0),
            Self::Bipolar => intensity.clamp(-1.0, 1.0),
        }
    }
}

/// What an actuator does to the container it is attached to.  Decides
/// which fill state the container's admission gate insists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRole {
    /// Moves fluid out; needs the container not empty.
    Drains,
    /// Moves fluid in; needs the container not full.
    Fills,
    /// Must stay under the fluid line; needs the container not empty.
    Submerged,
    /// Indifferent to fill state.
    Unattached,
}

impl ContainerRole {
    pub fn of(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::WaterPump | ObjectKind::PeristalticPump | ObjectKind::DrainValve => {
                Self::Drains
            }
            ObjectKind::FillValve => Self::Fills,
            ObjectKind::WaterHeater | ObjectKind::WaterAerator => Self::Submerged,
            _ => Self::Unattached,
        }
    }
}

/// Notification fired on enable/disable edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorEvent {
    Activated { key: Key, intensity: f32 },
    Deactivated { key: Key },
}

/// Persisted form of an [`Actuator`].  Links are stored as key strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorData {
    pub id: Identity,
    #[serde(default)]
    pub enable_mode: Option<EnableMode>,
    #[serde(default)]
    pub range: OutputRange,
    #[serde(default)]
    pub power_draw_watts: f32,
    #[serde(default)]
    pub flow_rate_lpm: f32,
    #[serde(default)]
    pub container: KeyString,
    #[serde(default)]
    pub rail: KeyString,
}

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

pub struct Actuator {
    identity: Identity,
    key: Key,
    enable_mode: EnableMode,
    range: OutputRange,
    power_draw_watts: f32,
    /// Continuous flow rate in L/min (pumps only; 0 = unknown).
    flow_rate_lpm: f32,
    container: Attachment,
    rail: Attachment,
    output: Box<dyn OutputPort>,
    /// Observed requests, in insertion order.
    handles: Vec<WeakActivation, MAX_HANDLES>,
    enabled: bool,
    needs_update: bool,
    drive_intensity: f32,
    last_update_ms: Option<u32>,
    gate_blocked: bool,
    signal: Signal<ActuatorEvent>,
    config_dirty: bool,
}

impl Actuator {
    pub fn new(identity: Identity, output: Box<dyn OutputPort>) -> Self {
        debug_assert_eq!(identity.kind.class(), ObjectClass::Actuator);
        let key = identity.key();
        Self {
            identity,
            key,
            enable_mode: EnableMode::default(),
            range: OutputRange::default(),
            power_draw_watts: 0.0,
            flow_rate_lpm: 0.0,
            container: Attachment::new(Some(key)).accepting(ObjectClass::Reservoir),
            rail: Attachment::new(Some(key)).accepting(ObjectClass::Rail),
            output,
            handles: Vec::new(),
            enabled: false,
            // Drive the output to a known-off state on the first tick.
            needs_update: true,
            drive_intensity: 0.0,
            last_update_ms: None,
            gate_blocked: false,
            signal: Signal::new(),
            config_dirty: false,
        }
    }

    pub fn with_enable_mode(mut self, mode: EnableMode) -> Self {
        self.enable_mode = mode;
        self
    }

    pub fn with_range(mut self, range: OutputRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_power_draw(mut self, watts: f32) -> Self {
        self.power_draw_watts = watts.max(0.0);
        self
    }

    pub fn with_flow_rate(mut self, litres_per_min: f32) -> Self {
        self.flow_rate_lpm = litres_per_min.max(0.0);
        self
    }

    /// Rebuild from persisted data.  Links stay unresolved until the first
    /// tick, so objects may be restored in any order.
    pub fn from_data(data: &ActuatorData, output: Box<dyn OutputPort>, default_mode: EnableMode) -> Self {
        let mut actuator = Self::new(data.id, output)
            .with_enable_mode(data.enable_mode.unwrap_or(default_mode))
            .with_range(data.range)
            .with_power_draw(data.power_draw_watts)
            .with_flow_rate(data.flow_rate_lpm);
        actuator.container = Attachment::from_key_string(Some(actuator.key), &data.container)
            .accepting(ObjectClass::Reservoir);
        actuator.rail =
            Attachment::from_key_string(Some(actuator.key), &data.rail).accepting(ObjectClass::Rail);
        actuator
    }

    pub fn to_data(&self) -> ActuatorData {
        ActuatorData {
            id: self.identity,
            enable_mode: Some(self.enable_mode),
            range: self.range,
            power_draw_watts: self.power_draw_watts,
            flow_rate_lpm: self.flow_rate_lpm,
            container: self.container.key_string(),
            rail: self.rail.key_string(),
        }
    }

    // ── Identity & configuration ──────────────────────────────

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn kind(&self) -> ObjectKind {
        self.identity.kind
    }

    pub fn container_role(&self) -> ContainerRole {
        ContainerRole::of(self.identity.kind)
    }

    pub fn enable_mode(&self) -> EnableMode {
        self.enable_mode
    }

    pub fn set_enable_mode(&mut self, mode: EnableMode) {
        if mode != self.enable_mode {
            self.enable_mode = mode;
            self.needs_update = true;
            self.config_dirty = true;
        }
    }

    pub fn range(&self) -> OutputRange {
        self.range
    }

    pub fn power_draw_watts(&self) -> f32 {
        self.power_draw_watts
    }

    pub fn flow_rate_lpm(&self) -> f32 {
        self.flow_rate_lpm
    }

    pub fn container(&self) -> &Attachment {
        &self.container
    }

    pub fn rail(&self) -> &Attachment {
        &self.rail
    }

    /// Attach to the reservoir whose fill state gates this actuator.
    pub fn set_container<'a>(&mut self, target: impl Into<AttachTarget<'a>>, registry: &mut Registry) -> bool {
        let changed = self.container.set(target, registry);
        self.note_link_change(changed);
        changed
    }

    /// Attach to the power rail whose budget gates this actuator.
    pub fn set_rail<'a>(&mut self, target: impl Into<AttachTarget<'a>>, registry: &mut Registry) -> bool {
        let changed = self.rail.set(target, registry);
        self.note_link_change(changed);
        changed
    }

    /// Force re-arbitration on the next tick.
    pub fn set_needs_update(&mut self) {
        self.needs_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Returns and clears the "configuration changed" flag.
    pub fn take_config_dirty(&mut self) -> bool {
        core::mem::take(&mut self.config_dirty)
    }

    // ── Requests ──────────────────────────────────────────────

    /// Request activation at `intensity` for `duration_ms` (or until the
    /// handle is dropped).  Returns an invalid handle if the actuator is
    /// already tracking its maximum number of requests.
    pub fn enable(&mut self, intensity: f32, duration_ms: Option<u32>) -> ActivationHandle {
        self.enable_or_invalid(intensity, duration_ms, false)
    }

    /// Like [`enable`](Self::enable), but bypasses the admission gates.
    pub fn enable_forced(&mut self, intensity: f32, duration_ms: Option<u32>) -> ActivationHandle {
        self.enable_or_invalid(intensity, duration_ms, true)
    }

    fn enable_or_invalid(&mut self, intensity: f32, duration_ms: Option<u32>, forced: bool) -> ActivationHandle {
        self.try_enable(intensity, duration_ms, forced)
            .unwrap_or_else(|_| ActivationHandle::invalid())
    }

    pub fn try_enable(
        &mut self,
        intensity: f32,
        duration_ms: Option<u32>,
        forced: bool,
    ) -> Result<ActivationHandle, ActuatorError> {
        if self.handles.is_full() {
            self.handles.retain(|w| w.strong_count() > 0);
        }
        let shared: SharedActivation = Rc::new(RefCell::new(Activation::new(
            self.key,
            intensity,
            duration_ms,
            forced,
        )));
        if self.handles.push(Rc::downgrade(&shared)).is_err() {
            warn!("{}: request rejected, {} handles outstanding", self.identity, MAX_HANDLES);
            return Err(ActuatorError::HandleCapacity);
        }
        self.needs_update = true;
        debug!(
            "{}: new request intensity={:.2} duration={:?} forced={}",
            self.identity, intensity, duration_ms, forced
        );
        Ok(ActivationHandle::from_shared(shared))
    }

    /// Pump `litres` at full intensity, timed from the continuous flow rate.
    ///
    /// Returns an invalid handle when no container is resolved or no flow
    /// rate is configured, so callers can check-then-use uniformly.
    pub fn pump_volume(&mut self, litres: f32) -> ActivationHandle {
        if !self.container.is_resolved() {
            debug!("{}: pump request without a resolved container", self.identity);
            return ActivationHandle::invalid();
        }
        if self.flow_rate_lpm <= 0.0 || litres <= 0.0 {
            return ActivationHandle::invalid();
        }
        let duration_ms = (litres / self.flow_rate_lpm * 60_000.0).round() as u32;
        self.enable(1.0, Some(duration_ms))
    }

    // ── State queries ─────────────────────────────────────────

    /// Enabled and driving at least `tolerance` in magnitude.
    pub fn is_enabled(&self, tolerance: f32) -> bool {
        self.enabled && self.drive_intensity.abs() >= tolerance
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Intensity currently sent to the output (0 while disabled).
    pub fn drive_intensity(&self) -> f32 {
        self.drive_intensity
    }

    /// Requests still pending or active.
    pub fn active_handle_count(&self) -> usize {
        self.handles
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|a| !a.borrow().state.is_terminal())
            .count()
    }

    // ── Notifications ─────────────────────────────────────────

    pub fn subscribe(&mut self, callback: impl FnMut(&ActuatorEvent) + 'static) -> Option<SubscriptionId> {
        self.signal.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.signal.unsubscribe(id)
    }

    pub(crate) fn flush_notifications(&mut self, forward: impl FnMut(&ActuatorEvent)) -> usize {
        self.signal.flush(forward)
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Run one arbitration pass.
    pub(crate) fn update(&mut self, now_ms: u32, registry: &mut Registry) {
        self.container.resolve(registry);
        self.rail.resolve(registry);

        let dt = match self.last_update_ms {
            Some(last) if self.enabled => now_ms.wrapping_sub(last),
            _ => 0,
        };
        self.last_update_ms = Some(now_ms);

        // 1. Garbage collection
        let (any_valid, any_forced) = self.collect_handles(dt);

        // 2. Admission
        let mut can_enable = any_valid;
        if any_valid && !any_forced {
            let open = self.gates_open(registry);
            if !open && !self.gate_blocked {
                info!("{}: demand held back by admission gate", self.identity);
            }
            self.gate_blocked = !open;
            can_enable = open;
        } else {
            self.gate_blocked = false;
        }

        // 3-5. Disable or enable the output
        let settled = if !can_enable {
            !(self.enabled || self.needs_update) || self.disable_output()
        } else if !self.enabled || self.needs_update {
            self.enable_output(now_ms.max(1))
        } else {
            true
        };

        // 6. Failed writes are retried next tick.
        self.needs_update = !settled;
    }

    /// Drop finished, cancelled, and foreign requests; promote new ones.
    /// Returns `(any_valid, any_forced)` over the survivors.
    fn collect_handles(&mut self, dt: u32) -> (bool, bool) {
        let key = self.key;
        let serial = self.enable_mode.is_serial();
        let mut any_valid = false;
        let mut any_forced = false;
        let mut changed = false;

        self.handles.retain(|weak| {
            let Some(shared) = weak.upgrade() else {
                changed = true;
                return false;
            };
            let mut a = shared.borrow_mut();

            if a.actuator.key() != Some(key) && !a.state.is_terminal() {
                a.state = HandleState::Invalid;
            }
            if a.state == HandleState::Active && dt > 0 && (!serial || a.check_time != 0) {
                a.elapsed_ms = a.elapsed_ms.saturating_add(dt);
            }
            if a.state == HandleState::Pending {
                a.state = HandleState::Active;
                changed = true;
            }
            if a.state == HandleState::Active && a.is_elapsed() {
                a.state = HandleState::Done;
            }
            if a.state.is_terminal() {
                a.check_time = 0;
                changed = true;
                return false;
            }
            if a.dirty {
                a.dirty = false;
                changed = true;
            }

            any_valid = true;
            any_forced |= a.forced;
            true
        });

        if changed {
            self.needs_update = true;
        }
        (any_valid, any_forced)
    }

    fn gates_open(&self, registry: &Registry) -> bool {
        self.gate_allows::<Reservoir>(&self.container, registry)
            && self.gate_allows::<Rail>(&self.rail, registry)
    }

    /// An unset link imposes nothing; a set link must resolve to a gate of
    /// the right kind that lets us through.
    fn gate_allows<G: AdmissionGate + ObjectCast>(&self, link: &Attachment, registry: &Registry) -> bool {
        if !link.is_set() {
            return true;
        }
        link.get_as::<G>(registry)
            .is_some_and(|gate| gate.can_activate(self, registry))
    }

    fn disable_output(&mut self) -> bool {
        let written = match self.output.disable() {
            Ok(()) => true,
            Err(e) => {
                error!("{}: failed to disable output: {}", self.identity, e);
                false
            }
        };

        for shared in self.handles.iter().filter_map(Weak::upgrade) {
            shared.borrow_mut().check_time = 0;
        }
        self.drive_intensity = 0.0;

        if self.enabled {
            self.enabled = false;
            info!("{}: deactivated", self.identity);
            self.signal.fire(ActuatorEvent::Deactivated { key: self.key });
        }
        written
    }

    fn enable_output(&mut self, stamp: u32) -> bool {
        let intensity = self.range.clamp(self.arbitrate(stamp));
        if let Err(e) = self.output.drive(intensity) {
            error!("{}: failed to drive output: {}", self.identity, e);
            return false;
        }

        self.drive_intensity = intensity;
        if self.enabled {
            debug!("{}: drive intensity now {:.3}", self.identity, intensity);
        } else {
            self.enabled = true;
            info!("{}: activated at {:.3}", self.identity, intensity);
            self.signal.fire(ActuatorEvent::Activated {
                key: self.key,
                intensity,
            });
        }
        true
    }

    /// Compute the driving intensity and stamp the driving handle(s).
    fn arbitrate(&mut self, stamp: u32) -> f32 {
        let live: Vec<SharedActivation, MAX_HANDLES> =
            self.handles.iter().filter_map(Weak::upgrade).collect();
        let values: Vec<f32, MAX_HANDLES> = live.iter().map(|a| a.borrow().intensity).collect();
        if values.is_empty() {
            return 0.0;
        }

        match select(self.enable_mode, &values) {
            Selection::Single(index) => {
                for (i, shared) in live.iter().enumerate() {
                    shared.borrow_mut().check_time = if i == index { stamp } else { 0 };
                }
                values[index]
            }
            Selection::Combined(combined) => {
                for shared in &live {
                    let mut a = shared.borrow_mut();
                    if a.intensity == combined && a.check_time == 0 {
                        a.check_time = stamp;
                    }
                }
                combined
            }
        }
    }

    // ── Lifecycle hooks ───────────────────────────────────────

    /// A registered object is gone; drop any link resolved to it.
    pub(crate) fn unresolve_any(&mut self, key: Key) {
        let container = self.container.unresolve_any(key);
        let rail = self.rail.unresolve_any(key);
        if container || rail {
            self.needs_update = true;
        }
    }

    /// Called once when the actuator leaves the registry.  A running output
    /// is switched off and its deactivation queued; the caller flushes it.
    pub(crate) fn teardown(&mut self, registry: &mut Registry) {
        for shared in self.handles.iter().filter_map(Weak::upgrade) {
            shared.borrow_mut().invalidate();
        }
        self.handles.clear();

        if self.enabled {
            if let Err(e) = self.output.disable() {
                error!("{}: failed to disable output on removal: {}", self.identity, e);
            }
            self.enabled = false;
            self.drive_intensity = 0.0;
            info!("{}: deactivated on removal", self.identity);
            self.signal.fire(ActuatorEvent::Deactivated { key: self.key });
        }

        self.container.detach(registry);
        self.rail.detach(registry);
    }

    fn note_link_change(&mut self, changed: bool) {
        if changed {
            self.needs_update = true;
            self.config_dirty = true;
        }
    }
}

impl fmt::Debug for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actuator")
            .field("identity", &self.identity)
            .field("enable_mode", &self.enable_mode)
            .field("enabled", &self.enabled)
            .field("drive_intensity", &self.drive_intensity)
            .field("handles", &self.handles.len())
            .field("container", &self.container)
            .field("rail", &self.rail)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Selection {
    /// Parallel modes: all handles contribute to one value.
    Combined(f32),
    /// Serial modes: index of the one handle that drives.
    Single(usize),
}

/// Reconcile `values` (non-empty, insertion order) under `mode`.
fn select(mode: EnableMode, values: &[f32]) -> Selection {
    let highest = || values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let lowest = || values.iter().copied().fold(f32::INFINITY, f32::min);

    match mode {
        EnableMode::Highest => Selection::Combined(highest()),
        EnableMode::Lowest => Selection::Combined(lowest()),
        EnableMode::Average => Selection::Combined(values.iter().sum::<f32>() / values.len() as f32),
        EnableMode::Multiply => Selection::Combined(values.iter().product()),
        EnableMode::InOrder => Selection::Single(0),
        EnableMode::RevOrder => Selection::Single(values.len() - 1),
        EnableMode::AscOrder => {
            let low = lowest();
            Selection::Single(values.iter().position(|v| *v == low).unwrap_or(0))
        }
        EnableMode::DescOrder => {
            let high = highest();
            Selection::Single(values.iter().rposition(|v| *v == high).unwrap_or(0))
        }
    }
}
