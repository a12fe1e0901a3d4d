//! PolicySource contract
//!
//! The engine depends only on this read contract. The HTTP implementation
//! lives in `logic::remote`.

use async_trait::async_trait;

use super::types::{PolicyCategory, PolicySnapshot};
use crate::logic::error::FetchError;

/// Authenticated remote service exposing the rules of one category.
///
/// Transport, auth and server failures are all treated identically by the
/// engine (stale-cache path).
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch the current rule set of `category` as a typed snapshot
    async fn fetch_rules(
        &self,
        category: PolicyCategory,
        active_only: bool,
    ) -> Result<PolicySnapshot, FetchError>;
}
