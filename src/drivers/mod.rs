//! Actuator output drivers.

pub mod output;
