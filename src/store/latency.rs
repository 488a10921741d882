use super::LedgerStore;
use crate::errors::AppResult;
use crate::models::{AppSettings, LeadFunnelEntry, RevenueEntry, SaveLeadEntryPayload, SaveRevenueEntryPayload};
use async_trait::async_trait;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyProfile {
    pub load: Duration,
    pub lead_save: Duration,
    pub revenue_save: Duration,
}

impl LatencyProfile {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            load: Duration::from_millis(settings.load_latency_ms),
            lead_save: Duration::from_millis(settings.lead_save_latency_ms),
            revenue_save: Duration::from_millis(settings.revenue_save_latency_ms),
        }
    }

    /// Delays the hosted dashboard used to make local storage feel remote.
    pub fn dashboard() -> Self {
        Self {
            load: Duration::ZERO,
            lead_save: Duration::from_millis(500),
            revenue_save: Duration::from_millis(600),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.load.is_zero() && self.lead_save.is_zero() && self.revenue_save.is_zero()
    }
}

/// Sleeps before delegating each call, to exercise loading states against a fast store.
pub struct SimulatedLatency<S> {
    inner: S,
    profile: LatencyProfile,
}

impl<S: LedgerStore> SimulatedLatency<S> {
    pub fn new(inner: S, profile: LatencyProfile) -> Self {
        Self { inner, profile }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for SimulatedLatency<S> {
    async fn load_lead_entries(&self) -> AppResult<Vec<LeadFunnelEntry>> {
        pause(self.profile.load).await;
        self.inner.load_lead_entries().await
    }

    async fn save_lead_entry(&self, payload: SaveLeadEntryPayload) -> AppResult<LeadFunnelEntry> {
        pause(self.profile.lead_save).await;
        self.inner.save_lead_entry(payload).await
    }

    async fn load_revenue_entries(&self) -> AppResult<Vec<RevenueEntry>> {
        pause(self.profile.load).await;
        self.inner.load_revenue_entries().await
    }

    async fn save_revenue_entry(&self, payload: SaveRevenueEntryPayload) -> AppResult<RevenueEntry> {
        pause(self.profile.revenue_save).await;
        self.inner.save_revenue_entry(payload).await
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::{LatencyProfile, SimulatedLatency};
    use crate::models::{AppSettings, SaveRevenueEntryPayload};
    use crate::store::{Ledger, LedgerStore, MemoryBackend};
    use std::sync::Arc;
    use tokio::time::{Duration, Instant};

    #[test]
    fn profile_follows_settings() {
        let settings = AppSettings {
            lead_save_latency_ms: 500,
            revenue_save_latency_ms: 600,
            ..AppSettings::default()
        };
        assert_eq!(LatencyProfile::from_settings(&settings), LatencyProfile::dashboard());
        assert!(LatencyProfile::from_settings(&AppSettings::default()).is_zero());
    }

    #[tokio::test]
    async fn save_waits_for_configured_delay_then_delegates() {
        let profile = LatencyProfile {
            revenue_save: Duration::from_millis(30),
            ..LatencyProfile::default()
        };
        let store = SimulatedLatency::new(Ledger::new(Arc::new(MemoryBackend::new())), profile);

        let started = Instant::now();
        let saved = store
            .save_revenue_entry(SaveRevenueEntryPayload {
                business_name: "Auto Sul".to_string(),
                setup_value: 100.0,
                mrr_value: 10.0,
                origin: "Outros".to_string(),
                product: "Combo Completo".to_string(),
            })
            .await
            .expect("save");
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(saved.business_name, "Auto Sul");

        let entries = store.inner().load_revenue_entries().await.expect("load");
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_fail_reads(true);
        let store = SimulatedLatency::new(Ledger::new(backend), LatencyProfile::default());

        let err = store.load_lead_entries().await.expect_err("read fails");
        assert!(err.is_storage());
    }
}
