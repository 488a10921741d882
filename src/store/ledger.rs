use super::{CollectionBackend, LedgerStore, Namespace, StoredCollection, COLLECTION_SCHEMA_VERSION};
use crate::errors::{AppError, AppResult};
use crate::models::{LeadFunnelEntry, RevenueEntry, SaveLeadEntryPayload, SaveRevenueEntryPayload};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// A record type that lives in its own ledger collection.
pub trait LedgerRecord: Serialize + DeserializeOwned + Send + 'static {
    const NAMESPACE: Namespace;

    fn date(&self) -> NaiveDate;

    /// Records written the first time the collection is read and nothing is stored.
    fn seed() -> Vec<Self>;
}

impl LedgerRecord for LeadFunnelEntry {
    const NAMESPACE: Namespace = Namespace::LeadFunnel;

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn seed() -> Vec<Self> {
        vec![
            LeadFunnelEntry {
                id: "1".to_string(),
                date: seed_date(2025, 1, 20),
                mql: 12,
                sql: 10,
                sales: 3,
                conversion_rate: 25.0,
            },
            LeadFunnelEntry {
                id: "2".to_string(),
                date: seed_date(2025, 1, 19),
                mql: 11,
                sql: 10,
                sales: 2,
                conversion_rate: 18.1,
            },
        ]
    }
}

impl LedgerRecord for RevenueEntry {
    const NAMESPACE: Namespace = Namespace::Revenue;

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn seed() -> Vec<Self> {
        vec![
            RevenueEntry {
                id: "1".to_string(),
                date: seed_date(2025, 1, 20),
                business_name: "Grupo Sinal".to_string(),
                setup_value: 5000.0,
                mrr_value: 1200.0,
                origin: "Google Ads".to_string(),
                product: "Autoforce Site".to_string(),
            },
            RevenueEntry {
                id: "2".to_string(),
                date: seed_date(2025, 1, 18),
                business_name: "Concessionária Elite".to_string(),
                setup_value: 3500.0,
                mrr_value: 800.0,
                origin: "Indicação".to_string(),
                product: "Autoforce MKT".to_string(),
            },
        ]
    }
}

/// `LedgerStore` over any collection backend.
///
/// Every save is a full read-modify-write of its collection. Saves through one `Ledger`
/// are serialized; saves from other handles on the same backend are caught by the
/// revision check while optimistic concurrency is on, and silently overwritten when off.
pub struct Ledger<B> {
    backend: Arc<B>,
    optimistic_concurrency: bool,
    today: Today,
    write_lock: Mutex<()>,
}

impl<B: CollectionBackend> Ledger<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            optimistic_concurrency: true,
            today: Arc::new(|| Utc::now().date_naive()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_optimistic_concurrency(mut self, enabled: bool) -> Self {
        self.optimistic_concurrency = enabled;
        self
    }

    /// Overrides the calendar used to date revenue entries.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    async fn load<T: LedgerRecord>(&self) -> AppResult<Vec<T>> {
        let backend = Arc::clone(&self.backend);
        let (mut records, seeded) = tokio::task::spawn_blocking(move || -> AppResult<(Vec<T>, bool)> {
            match backend.read_collection(T::NAMESPACE)? {
                Some(stored) => Ok((decode::<T>(&stored)?, false)),
                None => {
                    let seed_json = serde_json::to_string(&T::seed())?;
                    let stored = backend.seed_collection(T::NAMESPACE, &seed_json)?;
                    Ok((decode::<T>(&stored)?, true))
                }
            }
        })
        .await??;

        if seeded {
            tracing::info!(namespace = %T::NAMESPACE, count = records.len(), "seeded ledger collection");
        } else {
            tracing::debug!(namespace = %T::NAMESPACE, count = records.len(), "loaded ledger collection");
        }

        records.sort_by(|a, b| b.date().cmp(&a.date()));
        Ok(records)
    }

    async fn rewrite<T, F>(&self, apply: F) -> AppResult<i64>
    where
        T: LedgerRecord,
        F: FnOnce(&mut Vec<T>) + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let backend = Arc::clone(&self.backend);
        let optimistic = self.optimistic_concurrency;

        let result = tokio::task::spawn_blocking(move || -> AppResult<i64> {
            let (mut records, read_revision) = match backend.read_collection(T::NAMESPACE)? {
                Some(stored) => (decode::<T>(&stored)?, stored.revision),
                None => (Vec::new(), 0),
            };
            apply(&mut records);
            let records_json = serde_json::to_string(&records)?;
            backend.write_collection(T::NAMESPACE, &records_json, optimistic.then_some(read_revision))
        })
        .await?;

        match &result {
            Ok(revision) => {
                tracing::debug!(namespace = %T::NAMESPACE, revision = *revision, "rewrote ledger collection");
            }
            Err(AppError::Conflict(message)) => {
                tracing::warn!(namespace = %T::NAMESPACE, error = %message, "ledger write lost a revision race");
            }
            Err(error) => {
                tracing::warn!(namespace = %T::NAMESPACE, error = %error, "ledger write failed");
            }
        }
        result
    }
}

#[async_trait]
impl<B: CollectionBackend> LedgerStore for Ledger<B> {
    async fn load_lead_entries(&self) -> AppResult<Vec<LeadFunnelEntry>> {
        self.load::<LeadFunnelEntry>().await
    }

    async fn save_lead_entry(&self, payload: SaveLeadEntryPayload) -> AppResult<LeadFunnelEntry> {
        let entry = LeadFunnelEntry {
            id: mint_id(),
            date: payload.date,
            mql: payload.mql,
            sql: payload.sql,
            sales: payload.sales,
            conversion_rate: payload.conversion_rate,
        };

        let saved = entry.clone();
        let revision = self
            .rewrite::<LeadFunnelEntry, _>(move |history| {
                history.retain(|existing| existing.date != saved.date);
                history.push(saved);
            })
            .await?;

        tracing::info!(date = %entry.date, revision, "saved lead funnel entry");
        Ok(entry)
    }

    async fn load_revenue_entries(&self) -> AppResult<Vec<RevenueEntry>> {
        self.load::<RevenueEntry>().await
    }

    async fn save_revenue_entry(&self, payload: SaveRevenueEntryPayload) -> AppResult<RevenueEntry> {
        let entry = RevenueEntry {
            id: mint_id(),
            date: (self.today)(),
            business_name: payload.business_name,
            setup_value: payload.setup_value,
            mrr_value: payload.mrr_value,
            origin: payload.origin,
            product: payload.product,
        };

        let saved = entry.clone();
        let revision = self
            .rewrite::<RevenueEntry, _>(move |history| history.push(saved))
            .await?;

        tracing::info!(date = %entry.date, revision, business = %entry.business_name, "saved revenue entry");
        Ok(entry)
    }
}

fn decode<T: LedgerRecord>(stored: &StoredCollection) -> AppResult<Vec<T>> {
    if stored.schema_version > COLLECTION_SCHEMA_VERSION {
        return Err(AppError::Storage(format!(
            "{} was written with schema version {} but only version {} is supported",
            T::NAMESPACE,
            stored.schema_version,
            COLLECTION_SCHEMA_VERSION
        )));
    }
    Ok(serde_json::from_str(&stored.records_json)?)
}

/// Time-ordered, so a later save always carries a later id.
fn mint_id() -> String {
    Uuid::now_v7().to_string()
}

fn seed_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid seed date")
}
