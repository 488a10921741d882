use crate::errors::AppResult;
use crate::models::{
    FunnelDraft, FunnelRollups, LeadFunnelEntry, Origin, Product, RevenueEntry, RevenueTotals, SaveLeadEntryPayload,
    SaveRevenueEntryPayload,
};
use crate::rollup::{compute_rollups, revenue_totals, sales_needed_for_target};
use crate::store::LedgerStore;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("valid number regex")
});

/// Lead funnel state for one client session: loaded history, the selected date and its draft.
pub struct LeadTracker {
    store: Arc<dyn LedgerStore>,
    history: Vec<LeadFunnelEntry>,
    selected_date: NaiveDate,
    draft: FunnelDraft,
}

impl LeadTracker {
    pub async fn open(store: Arc<dyn LedgerStore>, today: NaiveDate) -> AppResult<Self> {
        let mut tracker = Self {
            store,
            history: Vec::new(),
            selected_date: today,
            draft: FunnelDraft::default(),
        };
        tracker.reload().await?;
        Ok(tracker)
    }

    pub fn history(&self) -> &[LeadFunnelEntry] {
        &self.history
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    pub fn draft(&self) -> FunnelDraft {
        self.draft
    }

    pub fn set_draft(&mut self, draft: FunnelDraft) {
        self.draft = draft;
    }

    /// Switches the reference date. A saved entry for that date replaces the draft;
    /// otherwise whatever the user had typed is kept.
    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
        self.prefill_draft();
    }

    pub fn saved_entry_for_selected_date(&self) -> Option<&LeadFunnelEntry> {
        self.history.iter().find(|entry| entry.date == self.selected_date)
    }

    pub fn rollups(&self) -> FunnelRollups {
        compute_rollups(&self.history, self.selected_date, self.draft)
    }

    pub fn sales_needed_for_target(&self, target_pct: f64) -> i64 {
        sales_needed_for_target(&self.rollups().month, target_pct)
    }

    pub async fn reload(&mut self) -> AppResult<()> {
        self.history = self.store.load_lead_entries().await?;
        self.prefill_draft();
        Ok(())
    }

    /// Persists the draft for the selected date, then reloads history.
    /// On failure the draft and the loaded history are left as they were. Once the write
    /// has landed the saved entry is returned even if the reload fails; the stale history
    /// is kept until the next successful reload.
    pub async fn save(&mut self) -> AppResult<LeadFunnelEntry> {
        let payload = SaveLeadEntryPayload::from_draft(self.selected_date, self.draft);
        let saved = match self.store.save_lead_entry(payload).await {
            Ok(saved) => saved,
            Err(error) => {
                tracing::warn!(date = %self.selected_date, error = %error, "lead entry save failed; draft kept");
                return Err(error);
            }
        };
        if let Err(error) = self.reload().await {
            tracing::warn!(date = %saved.date, error = %error, "lead entry saved but history reload failed");
        }
        Ok(saved)
    }

    fn prefill_draft(&mut self) {
        if let Some(existing) = self.saved_entry_for_selected_date() {
            self.draft = existing.as_draft();
        }
    }
}

/// Raw revenue form input, as typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevenueForm {
    pub business_name: String,
    pub setup_value: String,
    pub mrr_value: String,
    pub origin: Origin,
    pub product: Product,
}

impl RevenueForm {
    /// `None` while a required field is blank or an amount has no leading number.
    pub fn to_payload(&self) -> Option<SaveRevenueEntryPayload> {
        if self.business_name.is_empty() || self.setup_value.is_empty() || self.mrr_value.is_empty() {
            return None;
        }
        Some(SaveRevenueEntryPayload {
            business_name: self.business_name.clone(),
            setup_value: parse_amount(&self.setup_value)?,
            mrr_value: parse_amount(&self.mrr_value)?,
            origin: self.origin.as_str().to_string(),
            product: self.product.as_str().to_string(),
        })
    }

    fn clear_entry_fields(&mut self) {
        self.business_name.clear();
        self.setup_value.clear();
        self.mrr_value.clear();
    }
}

/// Parses the leading number of `raw`, ignoring trailing text: `"1500abc"` -> `1500.0`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let matched = LEADING_NUMBER.find(raw)?;
    matched.as_str().trim().parse::<f64>().ok()
}

/// Revenue log state for one client session: loaded history and the entry form.
pub struct RevenueTracker {
    store: Arc<dyn LedgerStore>,
    history: Vec<RevenueEntry>,
    pub form: RevenueForm,
}

impl RevenueTracker {
    pub async fn open(store: Arc<dyn LedgerStore>) -> AppResult<Self> {
        let mut tracker = Self {
            store,
            history: Vec::new(),
            form: RevenueForm::default(),
        };
        tracker.reload().await?;
        Ok(tracker)
    }

    pub fn history(&self) -> &[RevenueEntry] {
        &self.history
    }

    pub fn totals(&self) -> RevenueTotals {
        revenue_totals(&self.history)
    }

    pub async fn reload(&mut self) -> AppResult<()> {
        self.history = self.store.load_revenue_entries().await?;
        Ok(())
    }

    /// Saves the form as a new deal. Returns `Ok(None)` without touching the store when
    /// the form is incomplete. On success the per-deal fields are cleared and history reloaded
    /// (a failed reload is logged, not returned); on failure the form is kept.
    pub async fn submit(&mut self) -> AppResult<Option<RevenueEntry>> {
        let Some(payload) = self.form.to_payload() else {
            tracing::debug!("revenue form incomplete; nothing saved");
            return Ok(None);
        };

        let saved = match self.store.save_revenue_entry(payload).await {
            Ok(saved) => saved,
            Err(error) => {
                tracing::warn!(error = %error, "revenue entry save failed; form kept");
                return Err(error);
            }
        };
        self.form.clear_entry_fields();
        if let Err(error) = self.reload().await {
            tracing::warn!(id = %saved.id, error = %error, "revenue entry saved but history reload failed");
        }
        Ok(Some(saved))
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_amount, LeadTracker, RevenueForm, RevenueTracker};
    use crate::errors::{AppError, AppResult};
    use crate::models::{
        FunnelDraft, LeadFunnelEntry, Origin, Product, RevenueEntry, SaveLeadEntryPayload, SaveRevenueEntryPayload,
    };
    use crate::store::{Ledger, LedgerStore, MemoryBackend, Namespace};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Saves go through; loads fail while `fail_loads` is set.
    struct UnreadableAfterSave {
        inner: Ledger<MemoryBackend>,
        fail_loads: AtomicBool,
    }

    impl UnreadableAfterSave {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: Ledger::new(Arc::new(MemoryBackend::new()))
                    .with_clock(|| NaiveDate::from_ymd_opt(2025, 2, 1).expect("date")),
                fail_loads: AtomicBool::new(false),
            })
        }

        fn check_load(&self) -> AppResult<()> {
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(AppError::Storage("simulated reload failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerStore for UnreadableAfterSave {
        async fn load_lead_entries(&self) -> AppResult<Vec<LeadFunnelEntry>> {
            self.check_load()?;
            self.inner.load_lead_entries().await
        }

        async fn save_lead_entry(&self, payload: SaveLeadEntryPayload) -> AppResult<LeadFunnelEntry> {
            self.inner.save_lead_entry(payload).await
        }

        async fn load_revenue_entries(&self) -> AppResult<Vec<RevenueEntry>> {
            self.check_load()?;
            self.inner.load_revenue_entries().await
        }

        async fn save_revenue_entry(&self, payload: SaveRevenueEntryPayload) -> AppResult<RevenueEntry> {
            self.inner.save_revenue_entry(payload).await
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    fn store_over(backend: &Arc<MemoryBackend>) -> Arc<dyn LedgerStore> {
        Arc::new(Ledger::new(Arc::clone(backend)).with_clock(|| NaiveDate::from_ymd_opt(2025, 2, 1).expect("date")))
    }

    #[tokio::test]
    async fn opening_on_a_saved_date_prefills_the_draft() {
        let backend = Arc::new(MemoryBackend::new());
        let tracker = LeadTracker::open(store_over(&backend), date("2025-01-20"))
            .await
            .expect("open");

        assert_eq!(tracker.history().len(), 2);
        assert_eq!(tracker.draft(), FunnelDraft { mql: 12, sql: 10, sales: 3 });
    }

    #[tokio::test]
    async fn selecting_an_unsaved_date_keeps_the_typed_draft() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = LeadTracker::open(store_over(&backend), date("2025-01-25"))
            .await
            .expect("open");
        assert_eq!(tracker.draft(), FunnelDraft::default());

        let typed = FunnelDraft { mql: 7, sql: 5, sales: 1 };
        tracker.set_draft(typed);
        tracker.select_date(date("2025-01-24"));
        assert_eq!(tracker.draft(), typed);

        tracker.select_date(date("2025-01-19"));
        assert_eq!(tracker.draft(), FunnelDraft { mql: 11, sql: 10, sales: 2 });
    }

    #[tokio::test]
    async fn rollups_use_the_live_draft_for_the_selected_date() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = LeadTracker::open(store_over(&backend), date("2025-01-20"))
            .await
            .expect("open");
        tracker.set_draft(FunnelDraft { mql: 5, sql: 4, sales: 1 });

        let rollups = tracker.rollups();
        assert_eq!(rollups.day.mql, 5);
        assert_eq!(rollups.day.conversion_rate, 20.0);
        assert_eq!(rollups.week.mql, 16);
        assert_eq!(rollups.week.conversion_rate, 18.75);
        assert_eq!(rollups.month.sales, 3);
        assert_eq!(tracker.sales_needed_for_target(15.0), 0);
    }

    #[tokio::test]
    async fn save_persists_draft_with_derived_rate_and_reloads() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = LeadTracker::open(store_over(&backend), date("2025-01-21"))
            .await
            .expect("open");
        tracker.set_draft(FunnelDraft { mql: 8, sql: 6, sales: 2 });

        let saved = tracker.save().await.expect("save");
        assert_eq!(saved.conversion_rate, 25.0);
        assert_eq!(tracker.history().len(), 3);
        assert_eq!(tracker.history()[0].date, date("2025-01-21"));
        assert_eq!(tracker.draft(), FunnelDraft { mql: 8, sql: 6, sales: 2 });
    }

    #[tokio::test]
    async fn failed_save_keeps_draft_and_history() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = LeadTracker::open(store_over(&backend), date("2025-01-21"))
            .await
            .expect("open");
        let typed = FunnelDraft { mql: 3, sql: 2, sales: 0 };
        tracker.set_draft(typed);

        backend.set_fail_writes(true);
        let err = tracker.save().await.expect_err("save fails");
        assert!(err.is_storage());
        assert_eq!(tracker.draft(), typed);
        assert_eq!(tracker.history().len(), 2);
    }

    #[tokio::test]
    async fn committed_save_is_returned_when_reload_fails() {
        let store = UnreadableAfterSave::new();
        let mut tracker = LeadTracker::open(store.clone(), date("2025-01-21"))
            .await
            .expect("open");
        tracker.set_draft(FunnelDraft { mql: 8, sql: 6, sales: 2 });

        store.fail_loads.store(true, Ordering::SeqCst);
        let saved = tracker.save().await.expect("write landed");
        assert_eq!(saved.date, date("2025-01-21"));
        assert_eq!(tracker.history().len(), 2);
        assert_eq!(tracker.draft(), FunnelDraft { mql: 8, sql: 6, sales: 2 });

        store.fail_loads.store(false, Ordering::SeqCst);
        tracker.reload().await.expect("reload");
        assert_eq!(tracker.history().len(), 3);
        assert_eq!(tracker.history()[0].id, saved.id);
    }

    #[tokio::test]
    async fn committed_revenue_submit_is_returned_when_reload_fails() {
        let store = UnreadableAfterSave::new();
        let mut tracker = RevenueTracker::open(store.clone()).await.expect("open");
        tracker.form.business_name = "Auto Sul".to_string();
        tracker.form.setup_value = "10".to_string();
        tracker.form.mrr_value = "1".to_string();

        store.fail_loads.store(true, Ordering::SeqCst);
        let saved = tracker.submit().await.expect("write landed").expect("saved");
        assert_eq!(saved.business_name, "Auto Sul");
        assert!(tracker.form.business_name.is_empty());
        assert_eq!(tracker.history().len(), 2);

        store.fail_loads.store(false, Ordering::SeqCst);
        tracker.reload().await.expect("reload");
        assert_eq!(tracker.history().len(), 3);
    }

    #[tokio::test]
    async fn incomplete_revenue_form_saves_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = RevenueTracker::open(store_over(&backend)).await.expect("open");
        let revision = backend.stored(Namespace::Revenue).expect("seeded").revision;

        tracker.form.business_name = "Auto Sul".to_string();
        tracker.form.setup_value = "1500".to_string();
        assert!(tracker.submit().await.expect("submit").is_none());

        tracker.form.mrr_value = "abc".to_string();
        assert!(tracker.submit().await.expect("submit").is_none());

        assert_eq!(backend.stored(Namespace::Revenue).expect("stored").revision, revision);
        assert_eq!(tracker.form.business_name, "Auto Sul");
    }

    #[tokio::test]
    async fn revenue_submit_appends_clears_fields_and_updates_totals() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = RevenueTracker::open(store_over(&backend)).await.expect("open");
        assert_eq!(tracker.totals().total_setup, 8500.0);
        assert_eq!(tracker.totals().total_mrr, 2000.0);

        tracker.form = RevenueForm {
            business_name: "Auto Sul".to_string(),
            setup_value: "1500".to_string(),
            mrr_value: "400.50".to_string(),
            origin: Origin::FacebookMeta,
            product: Product::FullBundle,
        };
        let saved = tracker.submit().await.expect("submit").expect("saved");
        assert_eq!(saved.date, date("2025-02-01"));
        assert_eq!(saved.origin, "Facebook/Meta");
        assert_eq!(saved.product, "Combo Completo");

        assert_eq!(tracker.history().len(), 3);
        assert_eq!(tracker.history()[0].business_name, "Auto Sul");
        assert_eq!(tracker.totals().total_setup, 10000.0);
        assert_eq!(tracker.totals().total_mrr, 2400.5);
        assert!(tracker.form.business_name.is_empty());
        assert!(tracker.form.setup_value.is_empty());
        assert_eq!(tracker.form.origin, Origin::FacebookMeta);
        assert_eq!(tracker.form.product, Product::FullBundle);
    }

    #[tokio::test]
    async fn failed_revenue_submit_keeps_form() {
        let backend = Arc::new(MemoryBackend::new());
        let mut tracker = RevenueTracker::open(store_over(&backend)).await.expect("open");
        tracker.form.business_name = "Auto Sul".to_string();
        tracker.form.setup_value = "10".to_string();
        tracker.form.mrr_value = "1".to_string();

        backend.set_fail_writes(true);
        tracker.submit().await.expect_err("save fails");
        assert_eq!(tracker.form.business_name, "Auto Sul");
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn amounts_parse_their_leading_number() {
        assert_eq!(parse_amount("1500"), Some(1500.0));
        assert_eq!(parse_amount(" 399.90 "), Some(399.9));
        assert_eq!(parse_amount("1500abc"), Some(1500.0));
        assert_eq!(parse_amount("-20.5"), Some(-20.5));
        assert_eq!(parse_amount(".5"), Some(0.5));
        assert_eq!(parse_amount("1e3"), Some(1000.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
    }
}
