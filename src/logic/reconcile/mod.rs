//! Reconciliation Module
//!
//! Converges device state to the latest policy snapshot.
//!
//! # Components
//! - `state.rs`: DeviceState (enforced targets per category)
//! - `plan.rs`: Snapshot vs. state diff -> ordered action plan
//! - `engine.rs`: ReconciliationEngine (fetch, plan, apply, report)

pub mod engine;
pub mod plan;
pub mod state;


pub use engine::{CycleGuard, CycleReport, EngineBuilder, ReconciliationEngine};
pub use plan::{pending_violations, plan_actions};
pub use state::DeviceState;
