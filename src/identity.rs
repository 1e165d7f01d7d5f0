//! Object identity and key hashing.
//!
//! Every object in the system is addressed by a [`Key`]: a 32-bit FNV-1a
//! hash of its printable key string.  An [`Identity`] (`{kind, index}`)
//! renders to a key string such as `WaterPump1`, so an identity and its
//! name always hash to the same key.
//!
//! ```text
//!   Identity{WaterPump, 0} ──▶ "WaterPump1" ──fnv1a──▶ Key(0x…)
//!   "MainRail"             ───────────────fnv1a──▶ Key(0x…)
//!   "#1a2b3c4d"            ──────────parse──────▶ Key(0x1a2b3c4d)
//! ```

use core::fmt::{self, Write};

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::config::MAX_NAME_LEN;

/// Printable key string with fixed capacity.
pub type KeyString = String<MAX_NAME_LEN>;

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Compact address of an object.  The sole way objects refer to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(u32);

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

impl Key {
    /// Wrap a raw key value (e.g. one read back from persisted data).
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Hash an explicit name.
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Interpret a persisted key string: `#xxxxxxxx` is a raw hex key,
    /// anything else is a name.
    pub fn parse(s: &str) -> Self {
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 8 {
                if let Ok(raw) = u32::from_str_radix(hex, 16) {
                    return Self(raw);
                }
            }
        }
        Self::from_name(s)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Raw hex form, used when no name is known.
    pub fn to_key_string(self) -> KeyString {
        let mut s = KeyString::new();
        // "#" + 8 hex digits always fits.
        let _ = write!(s, "{self}");
        s
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Object kinds
// ---------------------------------------------------------------------------

/// Broad class an [`ObjectKind`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Actuator,
    Reservoir,
    Rail,
}

/// Persisted type tag of every constructible object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    // ── Actuators ─────────────────────────────────────────
    GrowLight,
    WaterPump,
    PeristalticPump,
    WaterHeater,
    WaterAerator,
    FanExhaust,
    FillValve,
    DrainValve,

    // ── Reservoirs ────────────────────────────────────────
    FeedWater,
    MainsWater,
    Drainage,

    // ── Power rails ───────────────────────────────────────
    AcPower,
    DcPower,
}

impl ObjectKind {
    pub const fn class(self) -> ObjectClass {
        match self {
            Self::GrowLight
            | Self::WaterPump
            | Self::PeristalticPump
            | Self::WaterHeater
            | Self::WaterAerator
            | Self::FanExhaust
            | Self::FillValve
            | Self::DrainValve => ObjectClass::Actuator,
            Self::FeedWater | Self::MainsWater | Self::Drainage => ObjectClass::Reservoir,
            Self::AcPower | Self::DcPower => ObjectClass::Rail,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::GrowLight => "GrowLight",
            Self::WaterPump => "WaterPump",
            Self::PeristalticPump => "PeristalticPump",
            Self::WaterHeater => "WaterHeater",
            Self::WaterAerator => "WaterAerator",
            Self::FanExhaust => "FanExhaust",
            Self::FillValve => "FillValve",
            Self::DrainValve => "DrainValve",
            Self::FeedWater => "FeedWater",
            Self::MainsWater => "MainsWater",
            Self::Drainage => "Drainage",
            Self::AcPower => "AcPower",
            Self::DcPower => "DcPower",
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// `{kind, positional index}`.  Immutable once assigned to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub kind: ObjectKind,
    /// Zero-based; rendered one-based in the key string.
    pub index: u8,
}

impl Identity {
    pub const fn new(kind: ObjectKind, index: u8) -> Self {
        Self { kind, index }
    }

    /// Printable key string, e.g. `WaterPump1`.
    pub fn key_string(&self) -> KeyString {
        let mut s = KeyString::new();
        // Longest kind name plus three digits fits MAX_NAME_LEN.
        let _ = write!(s, "{}{}", self.kind.name(), u16::from(self.index) + 1);
        s
    }

    pub fn key(&self) -> Key {
        Key::from_name(&self.key_string())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.name(), u16::from(self.index) + 1)
    }
}
