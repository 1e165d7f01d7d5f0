//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements | Connects to            |
//! |----------------|------------|------------------------|
//! | `config_store` | ConfigPort | In-memory postcard blob|
//! | `log_sink`     | EventSink  | Serial log output      |
//!
//! Output drivers live in [`crate::drivers`].

pub mod config_store;
pub mod log_sink;
