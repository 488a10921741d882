//! Day / week / month funnel aggregates and revenue totals.
//!
//! The reference date's numbers always come from the caller's draft: any persisted record
//! for that same date is skipped in every window, and the day window is the draft alone.

use crate::models::{FunnelDraft, FunnelRollups, LeadFunnelEntry, RevenueEntry, RevenueTotals, RollupWindow};
use chrono::{Datelike, Duration, NaiveDate};

/// `sales / mql * 100`, or 0 when there are no MQLs.
pub fn conversion_rate(sales: i64, mql: i64) -> f64 {
    if mql > 0 {
        sales as f64 / mql as f64 * 100.0
    } else {
        0.0
    }
}

/// Most recent Sunday on or before `date`. Weeks always start on Sunday.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

pub fn compute_rollups(history: &[LeadFunnelEntry], reference: NaiveDate, draft: FunnelDraft) -> FunnelRollups {
    let week_from = week_start(reference);
    let mut week = Totals::default();
    let mut month = Totals::default();

    for entry in history.iter().filter(|entry| entry.date != reference) {
        if entry.date >= week_from && entry.date <= reference {
            week.add(entry.mql, entry.sql, entry.sales);
        }
        if entry.date.year() == reference.year()
            && entry.date.month() == reference.month()
            && entry.date <= reference
        {
            month.add(entry.mql, entry.sql, entry.sales);
        }
    }

    let mut day = Totals::default();
    for totals in [&mut day, &mut week, &mut month] {
        totals.add(draft.mql, draft.sql, draft.sales);
    }

    FunnelRollups {
        day: day.into_window(),
        week: week.into_window(),
        month: month.into_window(),
    }
}

/// Extra sales the month needs to reach `target_pct` conversion at its current MQL volume.
///
/// Zero or negative once the target is met.
pub fn sales_needed_for_target(month: &RollupWindow, target_pct: f64) -> i64 {
    (month.mql as f64 * target_pct / 100.0 - month.sales as f64).ceil() as i64
}

pub fn revenue_totals(entries: &[RevenueEntry]) -> RevenueTotals {
    entries.iter().fold(RevenueTotals::default(), |mut totals, entry| {
        totals.total_setup += entry.setup_value;
        totals.total_mrr += entry.mrr_value;
        totals
    })
}

#[derive(Debug, Default)]
struct Totals {
    mql: i64,
    sql: i64,
    sales: i64,
}

impl Totals {
    /// Saturates at the `i64` bounds.
    fn add(&mut self, mql: i64, sql: i64, sales: i64) {
        self.mql = self.mql.saturating_add(mql);
        self.sql = self.sql.saturating_add(sql);
        self.sales = self.sales.saturating_add(sales);
    }

    fn into_window(self) -> RollupWindow {
        RollupWindow {
            mql: self.mql,
            sql: self.sql,
            sales: self.sales,
            conversion_rate: conversion_rate(self.sales, self.mql),
        }
    }
}
