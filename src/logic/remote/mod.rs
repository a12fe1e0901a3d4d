//! Remote Module
//!
//! HTTP access to the central policy authority (REST over the blocklist
//! tables).
//!
//! # Components
//! - `client.rs`: RemoteClient (PolicySource + ComplianceSink)
//! - `rows.rs`: Response row types and their conversion into rule entries

pub mod client;
pub mod rows;

pub use client::RemoteClient;
