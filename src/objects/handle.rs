//! Activation handles: caller-owned tickets of demand on an actuator.
//!
//! ```text
//!   Pending ──first tick──▶ Active ──elapsed ≥ duration──▶ Done
//!                              │
//!                              └──cancel / drop / actuator gone──▶ Invalid
//! ```
//!
//! The caller owns the ticket (the only strong reference).  The actuator
//! keeps a weak reference and notices on its next tick when the ticket has
//! been dropped; there is no synchronous cancellation callback.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::attachment::Attachment;
use crate::identity::Key;

/// Lifecycle state of an activation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Created, not yet seen by an actuator tick.
    Pending,
    /// Counted into arbitration.
    Active,
    /// Duration fully elapsed.  Terminal.
    Done,
    /// Cancelled, dropped, or its actuator is gone.  Terminal.
    Invalid,
}

impl HandleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Invalid)
    }
}

/// State shared between the ticket and the actuator observing it.
#[derive(Debug)]
pub(crate) struct Activation {
    pub(crate) actuator: Attachment,
    pub(crate) intensity: f32,
    pub(crate) duration_ms: Option<u32>,
    pub(crate) elapsed_ms: u32,
    pub(crate) forced: bool,
    /// Tick time at which this request was last selected to drive; 0 when
    /// not selected.
    pub(crate) check_time: u32,
    pub(crate) state: HandleState,
    /// Intensity changed since the actuator last arbitrated.
    pub(crate) dirty: bool,
}

/// Requested intensity limited to `[-1, 1]`; NaN and infinities read as off.
fn sanitize_intensity(intensity: f32) -> f32 {
    if intensity.is_finite() {
        intensity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

pub(crate) type SharedActivation = Rc<RefCell<Activation>>;
pub(crate) type WeakActivation = Weak<RefCell<Activation>>;

impl Activation {
    pub(crate) fn new(actuator: Key, intensity: f32, duration_ms: Option<u32>, forced: bool) -> Self {
        let mut link = Attachment::new(None);
        link.set_unresolved(actuator);
        Self {
            actuator: link,
            intensity: sanitize_intensity(intensity),
            duration_ms,
            elapsed_ms: 0,
            forced,
            check_time: 0,
            state: HandleState::Pending,
            dirty: false,
        }
    }

    pub(crate) fn is_elapsed(&self) -> bool {
        self.duration_ms.is_some_and(|d| self.elapsed_ms >= d)
    }

    /// The actuator is going away.
    pub(crate) fn invalidate(&mut self) {
        self.actuator.forget();
        self.state = HandleState::Invalid;
        self.check_time = 0;
    }
}

/// One outstanding request to drive an actuator.
///
/// Dropping the handle cancels the request on the actuator's next tick.
#[derive(Debug)]
#[must_use = "dropping an ActivationHandle cancels the request"]
pub struct ActivationHandle {
    inner: Option<SharedActivation>,
}

impl ActivationHandle {
    /// A handle that was never attached to anything.  Always `Invalid`.
    pub fn invalid() -> Self {
        Self { inner: None }
    }

    pub(crate) fn from_shared(inner: SharedActivation) -> Self {
        Self { inner: Some(inner) }
    }

    fn read<R>(&self, f: impl FnOnce(&Activation) -> R) -> Option<R> {
        self.inner.as_ref().map(|a| f(&a.borrow()))
    }

    pub fn state(&self) -> HandleState {
        self.read(|a| a.state).unwrap_or(HandleState::Invalid)
    }

    /// Pending or Active.
    pub fn is_valid(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state() == HandleState::Active
    }

    pub fn is_done(&self) -> bool {
        self.state() == HandleState::Done
    }

    pub fn is_forced(&self) -> bool {
        self.read(|a| a.forced).unwrap_or(false)
    }

    /// Key of the actuator this request targets, while the link holds.
    pub fn actuator_key(&self) -> Option<Key> {
        self.read(|a| a.actuator.key()).flatten()
    }

    pub fn intensity(&self) -> f32 {
        self.read(|a| a.intensity).unwrap_or(0.0)
    }

    /// Change the requested intensity; the actuator re-arbitrates on its
    /// next tick.  Ignored once the handle is terminal.
    pub fn set_intensity(&mut self, intensity: f32) {
        if let Some(inner) = &self.inner {
            let mut a = inner.borrow_mut();
            if !a.state.is_terminal() {
                a.intensity = sanitize_intensity(intensity);
                a.dirty = true;
            }
        }
    }

    pub fn duration_ms(&self) -> Option<u32> {
        self.read(|a| a.duration_ms).flatten()
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.read(|a| a.elapsed_ms).unwrap_or(0)
    }

    /// Time left to run; `None` for indefinite requests.
    pub fn remaining_ms(&self) -> Option<u32> {
        self.read(|a| a.duration_ms.map(|d| d.saturating_sub(a.elapsed_ms)))
            .flatten()
    }

    /// Tick time this request was last stamped as driving (0 = not driving).
    pub fn check_time(&self) -> u32 {
        self.read(|a| a.check_time).unwrap_or(0)
    }

    pub fn is_selected(&self) -> bool {
        self.check_time() != 0
    }

    /// Withdraw the request.  The actuator drops it on its next tick.
    pub fn cancel(&mut self) {
        if let Some(inner) = &self.inner {
            let mut a = inner.borrow_mut();
            if !a.state.is_terminal() {
                a.state = HandleState::Invalid;
            }
        }
    }
}
