//! Hydroctl controller core library.
//!
//! Deferred object attachment and actuator arbitration for a grow
//! controller.  Objects (actuators, reservoirs, power rails) live in a
//! [`registry::Registry`] and refer to each other by [`identity::Key`];
//! the [`app::service::AppService`] ticks them, and actuators reconcile
//! concurrent [`objects::handle::ActivationHandle`]s into one output.
//!
//! Hardware is reached only through [`app::ports`] traits, so the whole
//! core runs on the host for testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod attachment;
pub mod config;
pub mod drivers;
pub mod error;
pub mod identity;
pub mod objects;
pub mod registry;
pub mod signal;
