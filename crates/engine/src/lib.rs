//! # Zonecast Engine
//!
//! This crate is the stateful heart of the application. It turns map clicks into regions,
//! acquires each region's hourly series and keeps every region's color in step with the
//! selected time window.
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Orchestration:** The engine composes the lower layers. Classification lives in
//!   `analytics`, the wire protocol in `api-client`, notifications in `events`.
//! - **One explicit store:** `RegionStore` owns regions, series, selection and window. Every
//!   mutation is validated first and then published as a `StoreEvent`.
//! - **No lock across I/O:** `Session` releases the store before awaiting an acquisition.
//!   Results are matched to a per-region ticket, so late or superseded responses are dropped.
//! - **Cancelable timers:** the drawing controller's auto-finalize timer is armed, re-armed and
//!   aborted explicitly, and its timeouts carry a token so a stale one cannot finalize.
//!
//! ## Public API
//!
//! - `Session`: the per-process orchestrator.
//! - `RegionStore`: the region model and its notifications.
//! - `SeriesMergeService`: retrospective and forward-looking acquisition.
//! - `DrawingController`: the polygon drawing state machine.
//! - `EngineError`: the specific error types that can be returned from this crate.

pub mod drawing;
pub mod error;
pub mod event;
pub mod merge;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use drawing::{DrawingController, DrawingOutcome, FinalizeReason, FinalizeTimer, Geometry};
pub use error::EngineError;
pub use event::{DrawingInput, TimerToken};
pub use merge::{SeriesMergeService, SplitPlan};
pub use session::{Clock, CreateOutcome, Session};
pub use store::{AcquisitionTicket, IngestOutcome, RegionDraft, RegionPatch, RegionStore};
