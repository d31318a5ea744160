//! Read-side contracts for the trends engine.
//!
//! Queries fetch information from whatever storage is backing the
//! application. They never modify data. The ledger is read-only from this
//! subsystem's perspective; the cube store is this subsystem's own table.

pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::periods::{Period, PeriodType};

use super::domain::{
    CubeRecord, CubeSlice, CubeStatistics, GroupByDimension, GroupedTotal, TransactionKind,
};

/// How an aggregation pass is scoped within a period window.
#[derive(Clone, Debug)]
pub enum BuildScope {
    /// Every dimensional group in the window.
    Full,
    /// Only the named (kind, category, recurring) slices. Used by targeted
    /// regeneration so a bulk update never rebuilds whole periods.
    Slices(Vec<CubeSlice>),
    /// Only rows belonging to one account. Used by scoped population.
    Account(Uuid),
}

pub type DynLedgerQueries = Arc<dyn LedgerQueries + Send + Sync>;

/// Read-only, grouped views over the transaction ledger.
#[async_trait]
pub trait LedgerQueries {
    /// Aggregate the ledger rows inside a period window, grouped by
    /// (kind, category, account, recurring). Groups with no rows produce
    /// no output. Signs are summed as stored; never normalized.
    async fn aggregate_period(
        &self,
        user_id: Uuid,
        period: &Period,
        scope: &BuildScope,
    ) -> Result<Vec<CubeRecord>>;

    /// The distinct (kind, category, recurring) combinations present among
    /// the given transactions.
    async fn distinct_slices(
        &self,
        user_id: Uuid,
        transaction_ids: &[Uuid],
    ) -> Result<Vec<CubeSlice>>;

    /// Earliest and latest transaction dates for a user, optionally scoped
    /// to one account. `None` when the ledger holds no matching rows.
    async fn date_bounds(
        &self,
        user_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<Option<(NaiveDate, NaiveDate)>>;

    /// Earliest and latest transaction dates among a set of rows.
    async fn date_bounds_for_ids(
        &self,
        user_id: Uuid,
        transaction_ids: &[Uuid],
    ) -> Result<Option<(NaiveDate, NaiveDate)>>;
}

/// Filter over stored cube rows. Always scoped to a native period type;
/// derived types are folded above this layer.
#[derive(Clone, Debug)]
pub struct CubeFilter {
    pub user_id: Uuid,
    pub period_type: PeriodType,
    /// Inclusive range; a row matches when its period intersects it.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub kind: Option<TransactionKind>,
    pub category_ids: Option<Vec<Uuid>>,
    pub account_ids: Option<Vec<Uuid>>,
    pub recurring: Option<bool>,
}

pub type DynCubeQueries = Arc<dyn CubeQueries + Send + Sync>;

/// Reads over the cube store.
#[async_trait]
pub trait CubeQueries {
    /// Stored records matching the filter, ordered by period start, then
    /// category, then account.
    async fn get_records(&self, filter: &CubeFilter) -> Result<Vec<CubeRecord>>;

    /// Totals rolled up over an arbitrary subset of dimensions.
    async fn grouped_totals(
        &self,
        group_by: &[GroupByDimension],
        filter: &CubeFilter,
    ) -> Result<Vec<GroupedTotal>>;

    /// Operational statistics for one user's cube.
    async fn statistics(&self, user_id: Uuid) -> Result<CubeStatistics>;
}
