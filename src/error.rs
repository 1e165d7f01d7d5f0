//! Unified error types for the controller core.
//!
//! Only *hard* conditions live here: programming errors such as registering
//! a duplicate key.  Routine not-ready states (unresolved links, gate
//! denials, empty demand) are represented in return values and object
//! state, never as errors.  All variants are `Copy` so they can be passed
//! around the tick loop without allocation.

use core::fmt;

use crate::identity::Key;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A registry operation was rejected.
    Registry(RegistryError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// An object with this key is already registered.
    DuplicateKey(Key),
    /// Every registry slot is occupied.
    Full,
    /// No live object is registered under this key.
    NotFound(Key),
    /// The object under this key is not of the requested kind.
    WrongKind(Key),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey(k) => write!(f, "duplicate key {k}"),
            Self::Full => write!(f, "registry full"),
            Self::NotFound(k) => write!(f, "no object with key {k}"),
            Self::WrongKind(k) => write!(f, "object {k} has the wrong kind"),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// The hardware output rejected a write.
    OutputWriteFailed,
    /// The actuator already observes its maximum number of handles.
    HandleCapacity,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputWriteFailed => write!(f, "output write failed"),
            Self::HandleCapacity => write!(f, "handle capacity exhausted"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
