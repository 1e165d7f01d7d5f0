//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (outputs, event sinks, storage) implement these traits.
//! The [`AppService`](super::service::AppService) and the objects it owns
//! consume them, so the domain core never touches hardware directly.
//!
//! ## Notes
//!
//! - **ConfigPort** implementations MUST store the whole object list
//!   atomically; a half-written configuration restores as corrupted.
//! - All port errors are typed, so callers handle every variant explicitly.

use crate::error::ActuatorError;
use crate::identity::Identity;
use crate::objects::ObjectData;

// ───────────────────────────────────────────────────────────────
// Output port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for one physical actuator output.
///
/// Intensity has already been clamped to the actuator's range by the
/// time it reaches the port: `[0, 1]` for unipolar, `[-1, 1]` for bipolar.
pub trait OutputPort {
    /// Drive the output at `intensity`.
    fn drive(&mut self, intensity: f32) -> Result<(), ActuatorError>;

    /// Switch the output fully off.
    fn disable(&mut self) -> Result<(), ActuatorError>;
}

/// Supplies an output for each actuator rebuilt from persisted data.
pub trait OutputFactory {
    fn output_for(&mut self, identity: &Identity) -> Box<dyn OutputPort>;
}

impl<F> OutputFactory for F
where
    F: FnMut(&Identity) -> Box<dyn OutputPort>,
{
    fn output_for(&mut self, identity: &Identity) -> Box<dyn OutputPort> {
        self(identity)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, MQTT,
/// a display, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the object configuration.
///
/// Attachments are stored as key strings, so the saved list may be
/// restored in any order; links resolve on the first tick.
pub trait ConfigPort {
    /// Load every persisted object.
    /// Returns [`ConfigError::NotFound`] on first boot.
    fn load(&self) -> Result<Vec<ObjectData>, ConfigError>;

    /// Persist the full object list, replacing what was stored.
    fn save(&mut self, objects: &[ObjectData]) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::error::Error for ConfigError {}
