//! Compliance Module
//!
//! # Components
//! - `reporter.rs`: Latest ComplianceStatus per category, device-level rollup
//! - `upload.rs`: Periodic upload of the rollup to the central authority

pub mod reporter;
pub mod upload;

pub use reporter::{
    ComplianceReporter, ComplianceSnapshot, ComplianceStatus, DeviceCompliance, SyncResult,
};
pub use upload::{run_upload_loop, ComplianceSink};
