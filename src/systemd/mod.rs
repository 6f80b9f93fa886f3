//! Bridge from the local service manager's status feed to domain events.
//!
//! The service-manager transport (D-Bus subscription and friends) lives
//! outside this crate. It hands over batches of `unit name -> status`, where
//! a missing status means the unit disappeared. [`UnitEventStream`] turns
//! every entry of a batch into one `UnitStateUpdated` event on the shared
//! event channel.
//!
//! # Ordering
//!
//! Batches are forwarded in arrival order. Within a batch, units are
//! forwarded in map iteration order, which is unspecified.
//!
//! # Backpressure
//!
//! There is no internal buffer. A slow event consumer stalls the bridge,
//! which in turn stops draining the inbound channel.

pub mod event;

pub use event::{translate_unit_statuses, UnitEventStream, UnitStatusBatch};
