//! Domain types for the trends cube.
//!
//! The cube keeps one pre-aggregated row per dimensional coordinate per
//! native period. Keys are modeled as structs with structural equality, so
//! grouping and deduplication never rely on string-serialized keys.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::periods::{Period, PeriodType};

/// What a ledger transaction represents.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    /// Stable identifier used for the `kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(anyhow::anyhow!("unknown transaction kind: {other}")),
        }
    }
}

/// The dimensional fields of one ledger row, as seen by the cube.
///
/// Amounts keep the sign the ledger stored. Aggregation never normalizes
/// with an absolute value; sign conventions are owned by the ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub recurring: bool,
}

impl TransactionSnapshot {
    /// The dimensional slice this row's amounts land in.
    pub fn slice(&self) -> CubeSlice {
        CubeSlice {
            kind: self.kind,
            category_id: self.category_id,
            recurring: self.recurring,
        }
    }
}

/// A dimensional slice within a period: every account's rows for one
/// (kind, category, recurring) combination.
///
/// Accounts are deliberately absent. Regenerating a slice recomputes all
/// accounts inside it, which is what makes account changes cheap to
/// invalidate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CubeSlice {
    pub kind: TransactionKind,
    pub category_id: Option<Uuid>,
    pub recurring: bool,
}

/// One stored aggregate row.
///
/// Composite key: (user, period type, period start, kind, category,
/// account, recurring). Rows are always replaced wholesale, never mutated
/// in place.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeRecord {
    pub user_id: Uuid,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub kind: TransactionKind,
    pub category_id: Option<Uuid>,
    pub account_id: Uuid,
    pub recurring: bool,
    pub total: Decimal,
    pub count: i64,
}

impl CubeRecord {
    pub fn average(&self) -> Decimal {
        if self.count > 0 {
            self.total / Decimal::from(self.count)
        } else {
            Decimal::ZERO
        }
    }

    pub fn slice(&self) -> CubeSlice {
        CubeSlice {
            kind: self.kind,
            category_id: self.category_id,
            recurring: self.recurring,
        }
    }
}

/// A cube coordinate marked stale and scheduled for recomputation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RegenerationTarget {
    pub user_id: Uuid,
    pub period: Period,
    pub slice: CubeSlice,
}

/// A uniform change to one field, applied to one row or to a batch.
///
/// Old and new values are carried as typed pairs rather than
/// field-name/value strings, so impact calculation cannot confuse
/// dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldChange {
    Account { old: Uuid, new: Uuid },
    Category { old: Option<Uuid>, new: Option<Uuid> },
    Kind { old: TransactionKind, new: TransactionKind },
    Recurring { old: bool, new: bool },
    Amount,
    Date,
}

/// A uniform field change applied to many ledger rows at once.
#[derive(Clone, Debug)]
pub struct BulkChange {
    pub user_id: Uuid,
    pub transaction_ids: Vec<Uuid>,
    pub changes: Vec<FieldChange>,
    /// Inclusive date range covering the affected rows. When absent, the
    /// ledger's min/max dates for the affected rows are used instead.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// Dimensions a grouped-totals query can roll up by.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupByDimension {
    PeriodStart,
    Kind,
    Category,
    Account,
    Recurring,
}

/// One row of a grouped-totals rollup. Only the grouped dimensions are
/// populated.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupedTotal {
    pub period_start: Option<NaiveDate>,
    pub kind: Option<TransactionKind>,
    pub category_id: Option<Option<Uuid>>,
    pub account_id: Option<Uuid>,
    pub recurring: Option<bool>,
    pub total: Decimal,
    pub count: i64,
}

/// Filters for trend queries.
#[derive(Clone, Debug)]
pub struct TrendsFilter {
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub kind: Option<TransactionKind>,
    pub category_ids: Option<Vec<Uuid>>,
    pub account_ids: Option<Vec<Uuid>>,
    pub recurring: Option<bool>,
}

/// Operational snapshot of one user's cube.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CubeStatistics {
    pub total_rows: i64,
    pub weekly_rows: i64,
    pub monthly_rows: i64,
    pub earliest_period_start: Option<NaiveDate>,
    pub latest_period_end: Option<NaiveDate>,
    pub distinct_accounts: i64,
    pub distinct_categories: i64,
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    fn record(total: Decimal, count: i64) -> CubeRecord {
        let period = Period::containing(
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            PeriodType::Monthly,
        );

        CubeRecord {
            user_id: Uuid::new_v4(),
            period_type: period.period_type,
            period_start: period.start,
            period_end: period.end,
            kind: TransactionKind::Expense,
            category_id: None,
            account_id: Uuid::new_v4(),
            recurring: false,
            total,
            count,
        }
    }

    #[test]
    fn average_divides_total_by_count() {
        assert_eq!(dec!(-25), record(dec!(-75), 3).average());
    }

    #[test]
    fn average_of_empty_record_is_zero() {
        assert_eq!(Decimal::ZERO, record(Decimal::ZERO, 0).average());
    }

    #[test]
    fn kind_round_trips_through_column_value() {
        for kind in [
            TransactionKind::Income,
            TransactionKind::Expense,
            TransactionKind::Transfer,
        ] {
            assert_eq!(kind, TransactionKind::try_from(kind.as_str()).unwrap());
        }
    }
}
