//! Logic Module - Policy Sync & Enforcement Engine
//!
//! ## Layout
//! - `policy/` - Policy types, PolicySource contract, PolicyCache
//! - `credentials/` - Credential store (endpoint + key)
//! - `remote/` - HTTP PolicySource and compliance upload
//! - `enforcement/` - Enforceable capability, website/software enforcers, OS hooks
//! - `reconcile/` - Device state, action planning, ReconciliationEngine
//! - `scheduler/` - Per-category single-flight SyncScheduler
//! - `compliance/` - ComplianceReporter and upload loop

pub mod agent;
pub mod compliance;
pub mod config;
pub mod credentials;
pub mod enforcement;
pub mod error;
pub mod policy;
pub mod reconcile;
pub mod remote;
pub mod scheduler;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
