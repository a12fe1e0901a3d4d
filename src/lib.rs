//! Device Compliance Agent - Core Library
//!
//! Pulls organization-wide policy (blocked websites, blocked software) from a
//! central authority and reconciles local device state against it.
//!
//! # Architecture
//!
//! ```text
//! SyncScheduler ──tick──▶ ReconciliationEngine ──fetch──▶ PolicySource
//!                              │        │
//!                              │        └──put──▶ PolicyCache
//!                              ▼
//!                         Enforceable (website / software)
//!                              │
//!                              ▼
//!                       ComplianceReporter ──upload──▶ central authority
//! ```

pub mod constants;
pub mod logic;

pub use logic::agent::ComplianceAgent;
pub use logic::config::AgentConfig;
