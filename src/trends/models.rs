//! Row models for the trends cube tables.
//!
//! Models mirror the column layout exactly; conversions into domain types
//! own the string-to-enum mapping for the `kind` and `period_type`
//! columns.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::periods::PeriodType;

use super::domain;

/// A persisted aggregate row from `trends_cube`.
#[derive(Debug, sqlx::FromRow)]
pub struct CubeRow {
    pub user_id: Uuid,
    pub period_type: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub kind: String,
    pub category_id: Option<Uuid>,
    pub account_id: Uuid,
    pub is_recurring: bool,
    pub total_amount: Decimal,
    pub transaction_count: i64,
}

impl TryFrom<CubeRow> for domain::CubeRecord {
    type Error = anyhow::Error;

    fn try_from(row: CubeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id,
            period_type: PeriodType::try_from(row.period_type.as_str())?,
            period_start: row.period_start,
            period_end: row.period_end,
            kind: domain::TransactionKind::try_from(row.kind.as_str())?,
            category_id: row.category_id,
            account_id: row.account_id,
            recurring: row.is_recurring,
            total: row.total_amount,
            count: row.transaction_count,
        })
    }
}

/// One group produced by aggregating ledger rows inside a period window.
#[derive(Debug, sqlx::FromRow)]
pub struct LedgerAggregateRow {
    pub kind: String,
    pub category_id: Option<Uuid>,
    pub account_id: Uuid,
    pub is_recurring: bool,
    pub total_amount: Decimal,
    pub transaction_count: i64,
}

impl LedgerAggregateRow {
    /// Attach the period window and owner that the aggregation ran over.
    pub fn into_record(
        self,
        user_id: Uuid,
        period: &crate::periods::Period,
    ) -> anyhow::Result<domain::CubeRecord> {
        Ok(domain::CubeRecord {
            user_id,
            period_type: period.period_type,
            period_start: period.start,
            period_end: period.end,
            kind: domain::TransactionKind::try_from(self.kind.as_str())?,
            category_id: self.category_id,
            account_id: self.account_id,
            recurring: self.is_recurring,
            total: self.total_amount,
            count: self.transaction_count,
        })
    }
}

/// A distinct (kind, category, recurring) combination present in a set of
/// ledger rows.
#[derive(Debug, sqlx::FromRow)]
pub struct SliceRow {
    pub kind: String,
    pub category_id: Option<Uuid>,
    pub is_recurring: bool,
}

impl TryFrom<SliceRow> for domain::CubeSlice {
    type Error = anyhow::Error;

    fn try_from(row: SliceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: domain::TransactionKind::try_from(row.kind.as_str())?,
            category_id: row.category_id,
            recurring: row.is_recurring,
        })
    }
}

/// Aggregate statistics over one user's cube rows.
#[derive(Debug, sqlx::FromRow)]
pub struct StatisticsRow {
    pub total_rows: i64,
    pub weekly_rows: i64,
    pub monthly_rows: i64,
    pub earliest_period_start: Option<NaiveDate>,
    pub latest_period_end: Option<NaiveDate>,
    pub distinct_accounts: i64,
    pub distinct_categories: i64,
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<StatisticsRow> for domain::CubeStatistics {
    fn from(row: StatisticsRow) -> Self {
        Self {
            total_rows: row.total_rows,
            weekly_rows: row.weekly_rows,
            monthly_rows: row.monthly_rows,
            earliest_period_start: row.earliest_period_start,
            latest_period_end: row.latest_period_end,
            distinct_accounts: row.distinct_accounts,
            distinct_categories: row.distinct_categories,
            last_updated: row.last_updated,
        }
    }
}
