//! Remote lookup service clients.

pub mod clinvar;

use async_trait::async_trait;
use pathoid_common::Result;

use crate::query::QueryDescriptor;

pub use clinvar::EutilsClient;

/// Executes one query descriptor against the remote variant database and
/// returns the raw response body.
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn execute(&self, query: &QueryDescriptor) -> Result<String>;
}
