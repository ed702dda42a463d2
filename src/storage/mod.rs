//! Alert history storage
//!
//! History is memory-only and bounded: the hub keeps the most recent
//! [`memory::ALERT_CAPACITY`] alerts and forgets everything on restart.
//!
//! The store is not synchronised itself. It is owned by the store actor
//! ([`crate::actors::store`]), which serialises every mutation.

pub mod memory;

pub use memory::{ALERT_CAPACITY, AlertStore};
