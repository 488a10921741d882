pub mod latency;
pub mod ledger;
pub mod memory;

use crate::errors::AppResult;
use crate::models::{LeadFunnelEntry, RevenueEntry, SaveLeadEntryPayload, SaveRevenueEntryPayload};
use async_trait::async_trait;
use std::fmt;

pub use latency::{LatencyProfile, SimulatedLatency};
pub use ledger::Ledger;
pub use memory::MemoryBackend;

/// Version stamped on every collection blob written by this crate.
pub const COLLECTION_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    LeadFunnel,
    Revenue,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeadFunnel => "lead_funnel_history",
            Self::Revenue => "revenue_history",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A serialized collection as the backend holds it. Revision 0 means nothing is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCollection {
    pub records_json: String,
    pub revision: i64,
    pub schema_version: i64,
}

/// Synchronous blob storage under the ledger. Implementations may block.
pub trait CollectionBackend: Send + Sync + 'static {
    fn read_collection(&self, namespace: Namespace) -> AppResult<Option<StoredCollection>>;

    /// Stores `records_json` only if the namespace is empty and returns whatever is stored afterwards.
    fn seed_collection(&self, namespace: Namespace, records_json: &str) -> AppResult<StoredCollection>;

    /// Replaces the whole collection and returns the new revision.
    ///
    /// With `expected_revision` set, the write only lands if the stored revision still
    /// matches (0 = must not exist yet); otherwise it fails with `AppError::Conflict`.
    fn write_collection(
        &self,
        namespace: Namespace,
        records_json: &str,
        expected_revision: Option<i64>,
    ) -> AppResult<i64>;
}

/// The four durable ledger operations behind an asynchronous, fallible boundary.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_lead_entries(&self) -> AppResult<Vec<LeadFunnelEntry>>;
    async fn save_lead_entry(&self, payload: SaveLeadEntryPayload) -> AppResult<LeadFunnelEntry>;
    async fn load_revenue_entries(&self) -> AppResult<Vec<RevenueEntry>>;
    async fn save_revenue_entry(&self, payload: SaveRevenueEntryPayload) -> AppResult<RevenueEntry>;
}
