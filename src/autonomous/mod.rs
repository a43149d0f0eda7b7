//! Actor State
//!
//! The long-lived, per-actor state that survives between cycles:
//! - **Goals**: prioritized objectives with numeric success thresholds
//! - **Memory**: a bounded history of closed episodes
//!
//! Both only ever change through the owning actor.

pub mod goals;
pub mod memory;

pub use goals::{document_goals, risk_goals, Criterion, Goal};
pub use memory::{MemoryBank, MemoryRecord};
