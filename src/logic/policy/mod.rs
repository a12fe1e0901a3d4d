//! Policy Module
//!
//! # Components
//! - `types.rs`: PolicyCategory, PolicyRule, PolicySnapshot
//! - `source.rs`: PolicySource read contract
//! - `cache.rs`: Last-known-good snapshot per category

pub mod cache;
pub mod source;
pub mod types;

pub use cache::PolicyCache;
pub use source::PolicySource;
pub use types::{PolicyCategory, PolicyRule, PolicySnapshot, RuleEntry};
