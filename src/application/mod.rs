//! Application layer containing the card lifecycle orchestration.
//!
//! Each component owns one concern and talks to storage only through the
//! domain ports. `CardEngine` wires them together over a single set of stores.

pub mod adjustments;
pub mod allocator;
pub mod engine;
pub mod lifecycle;
pub mod maintenance;
pub mod quota;
pub mod reconciler;
