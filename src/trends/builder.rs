//! The aggregation builder: reads grouped totals out of the ledger and
//! persists them as cube rows.

use anyhow::ensure;
use tracing::debug;
use uuid::Uuid;

use crate::periods::Period;

use super::{
    commands::DynCubeCommands,
    queries::{BuildScope, DynLedgerQueries},
};

/// Computes aggregate rows for a period window and writes them to the cube
/// store.
///
/// Re-entrant: running the same window twice with no intervening ledger
/// change produces identical rows, and duplicate coordinates are skipped
/// on insert.
#[derive(Clone)]
pub struct AggregationBuilder {
    ledger: DynLedgerQueries,
    cube: DynCubeCommands,
}

impl AggregationBuilder {
    pub fn new(ledger: DynLedgerQueries, cube: DynCubeCommands) -> Self {
        Self { ledger, cube }
    }

    /// Aggregate one period window, optionally scoped to named slices or a
    /// single account, and persist the result.
    ///
    /// Storage is sparse: dimensional groups with no matching ledger rows
    /// produce no cube row at all.
    ///
    /// # Returns
    ///
    /// The number of cube rows created.
    pub async fn build_period(
        &self,
        user_id: Uuid,
        period: &Period,
        scope: &BuildScope,
    ) -> anyhow::Result<u64> {
        ensure!(
            period.period_type.is_native(),
            "only native period types are stored; got {}",
            period.period_type.as_str()
        );

        let records = self.ledger.aggregate_period(user_id, period, scope).await?;

        if records.is_empty() {
            return Ok(0);
        }

        let created = self.cube.insert_records(&records).await?;

        debug!(
            %user_id,
            period_type = period.period_type.as_str(),
            period_start = %period.start,
            created,
            "Built cube period."
        );

        Ok(created)
    }
}
