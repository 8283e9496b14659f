//! # Zonecast Events
//!
//! This crate defines the change notifications the region store publishes to its
//! presentation collaborators (map surface, region list, timeline).
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the definitive
//! language for all state synchronization out of the store.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{AcquisitionFailure, RegionColor, StoreEvent};
