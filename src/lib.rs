pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod registry;
pub mod store;
pub mod systemd;
pub mod unit;

pub use error::{RegistryError, Result};
pub use event::Event;
pub use registry::{Lookup, Registry};
