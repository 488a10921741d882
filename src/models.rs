use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFunnelEntry {
    pub id: String,
    pub date: NaiveDate,
    pub mql: i64,
    pub sql: i64,
    pub sales: i64,
    pub conversion_rate: f64,
}

impl LeadFunnelEntry {
    pub fn is_highlighted(&self, threshold_pct: f64) -> bool {
        self.conversion_rate > threshold_pct
    }

    pub fn as_draft(&self) -> FunnelDraft {
        FunnelDraft {
            mql: self.mql,
            sql: self.sql,
            sales: self.sales,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueEntry {
    pub id: String,
    pub date: NaiveDate,
    pub business_name: String,
    pub setup_value: f64,
    pub mrr_value: f64,
    pub origin: String,
    pub product: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLeadEntryPayload {
    pub date: NaiveDate,
    pub mql: i64,
    pub sql: i64,
    pub sales: i64,
    pub conversion_rate: f64,
}

impl SaveLeadEntryPayload {
    /// Freezes a draft for `date`, deriving the stored conversion rate from its counts.
    pub fn from_draft(date: NaiveDate, draft: FunnelDraft) -> Self {
        Self {
            date,
            mql: draft.mql,
            sql: draft.sql,
            sales: draft.sales,
            conversion_rate: crate::rollup::conversion_rate(draft.sales, draft.mql),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRevenueEntryPayload {
    pub business_name: String,
    pub setup_value: f64,
    pub mrr_value: f64,
    pub origin: String,
    pub product: String,
}

/// Unsaved counts currently being edited for the selected date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelDraft {
    pub mql: i64,
    pub sql: i64,
    pub sales: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupWindow {
    pub mql: i64,
    pub sql: i64,
    pub sales: i64,
    pub conversion_rate: f64,
}

impl RollupWindow {
    pub fn is_highlighted(&self, threshold_pct: f64) -> bool {
        self.conversion_rate > threshold_pct
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelRollups {
    pub day: RollupWindow,
    pub week: RollupWindow,
    pub month: RollupWindow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueTotals {
    pub total_setup: f64,
    #[serde(rename = "totalMRR")]
    pub total_mrr: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    #[default]
    #[serde(rename = "Google Ads")]
    GoogleAds,
    #[serde(rename = "Facebook/Meta")]
    FacebookMeta,
    #[serde(rename = "Indicação")]
    Referral,
    #[serde(rename = "Orgânico")]
    Organic,
    #[serde(rename = "Outros")]
    Other,
}

impl Origin {
    pub const ALL: [Origin; 5] = [
        Self::GoogleAds,
        Self::FacebookMeta,
        Self::Referral,
        Self::Organic,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoogleAds => "Google Ads",
            Self::FacebookMeta => "Facebook/Meta",
            Self::Referral => "Indicação",
            Self::Organic => "Orgânico",
            Self::Other => "Outros",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|origin| origin.as_str().eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    #[default]
    #[serde(rename = "Autoforce Site")]
    Site,
    #[serde(rename = "Autoforce MKT")]
    Marketing,
    #[serde(rename = "Autoforce CRM")]
    Crm,
    #[serde(rename = "Combo Completo")]
    FullBundle,
}

impl Product {
    pub const ALL: [Product; 4] = [Self::Site, Self::Marketing, Self::Crm, Self::FullBundle];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Site => "Autoforce Site",
            Self::Marketing => "Autoforce MKT",
            Self::Crm => "Autoforce CRM",
            Self::FullBundle => "Combo Completo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|product| product.as_str().eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub optimistic_concurrency: bool,
    pub load_latency_ms: u64,
    pub lead_save_latency_ms: u64,
    pub revenue_save_latency_ms: u64,
    pub conversion_target_pct: f64,
    pub window_highlight_pct: f64,
    pub history_highlight_pct: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            optimistic_concurrency: true,
            load_latency_ms: 0,
            lead_save_latency_ms: 0,
            revenue_save_latency_ms: 0,
            conversion_target_pct: 15.0,
            window_highlight_pct: 10.0,
            history_highlight_pct: 15.0,
        }
    }
}
