//! # Zonecast Analytics
//!
//! This crate turns a region's hourly series into a display color. It acts as the
//! "unbiased judge" of every region on the map.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of external systems.
//!   It depends only on `core-types` (Layer 0).
//! - **Stateless Calculation:** `WindowAggregator` and `ColorRuleEngine` hold no state. They take
//!   a series slice or a rule snapshot as input and produce a value or a color, which makes
//!   recomputation idempotent and easy to test.
//! - **Drafts outside the model:** `RuleDraft` is an editable copy of a rule list. The committed
//!   rules never change until the draft is handed back to the store.
//!
//! ## Public API
//!
//! - `WindowAggregator`: window mean over a value array.
//! - `ColorRuleEngine`: first-match rule classification.
//! - `Classification`: the value and color a recompute produced.
//! - `RuleDraft` / `RulePatch`: rule editing.
//! - `AnalyticsError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod aggregation;
pub mod classifier;
pub mod draft;
pub mod error;

// Re-export the key components to create a clean, public-facing API.
pub use aggregation::WindowAggregator;
pub use classifier::{Classification, ColorRuleEngine};
pub use draft::{RuleDraft, RulePatch};
pub use error::AnalyticsError;
