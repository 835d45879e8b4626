//! # PSU Control Library
//!
//! Concurrent monitoring and control of a Rigol DP832 programmable power
//! supply. The instrument processes one command at a time, so everything in
//! this crate revolves around serializing access to it: two periodic
//! pollers and any number of on-demand writers share one exclusive gate to
//! the communication link and one in-memory snapshot of device state.
//!
//! ## Crate Structure
//!
//! - **`config`**: application settings loaded from TOML
//!   (`config::Settings`).
//! - **`error`**: the `PsuError` taxonomy separating connection, per
//!   transaction, range and parse failures.
//! - **`types`**: channels, measurements and the enumerated device states.
//! - **`link`**: the `InstrumentLink` command/response trait, the bounded
//!   retry connect helper, the serial implementation (feature
//!   `instrument_serial`) and a scripted mock for tests.
//! - **`gate`**: the exclusive access gate; one `Transaction` per logical
//!   instrument transaction, settle delays spent inside the lock.
//! - **`dp832`**: typed command gateway carrying the instrument's SCPI
//!   vocabulary and range limits.
//! - **`snapshot`**: shared last-known state read by external observers.
//! - **`events`**: broadcast notifications (`ValuesUpdated`,
//!   `ModeChanged`).
//! - **`monitor`**: the measurement and mode poller tasks.
//! - **`supply`**: the `PowerSupply` session facade tying it all together.

pub mod config;
pub mod dp832;
pub mod error;
pub mod events;
pub mod gate;
pub mod link;
pub mod monitor;
pub mod snapshot;
pub mod supply;
pub mod types;

pub use config::Settings;
pub use error::{PsuError, PsuResult};
pub use events::SupplyEvent;
pub use supply::PowerSupply;
pub use types::{
    Channel, Measurement, OutputState, ProtectionKind, ProtectionState, RegulationMode,
    SetpointKind,
};
