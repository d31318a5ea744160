//! The trends service: targeted regeneration, historical population, and
//! the read API.
//!
//! Ledger-mutation hooks are best-effort. A cube that briefly lags the
//! ledger self-heals on the next targeted regeneration, so a failed
//! rebuild is logged and swallowed rather than allowed to fail the
//! mutation that triggered it. Direct maintenance calls (`populate`,
//! `rebuild_period`, `clear_all`) propagate errors normally.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::periods::{Period, PeriodType, NATIVE_PERIOD_TYPES};

use super::{
    builder::AggregationBuilder,
    commands::DynCubeCommands,
    deltas,
    domain::{
        BulkChange, CubeRecord, CubeSlice, CubeStatistics, FieldChange, GroupByDimension,
        GroupedTotal, RegenerationTarget, TransactionSnapshot, TrendsFilter,
    },
    queries::{BuildScope, CubeFilter, DynCubeQueries, DynLedgerQueries},
    TrendsError,
};

/// Number of periods rebuilt between pauses during historical population.
const POPULATION_BATCH_SIZE: usize = 25;

/// Pause between population batches, bounding database load from what can
/// be a long-running backfill.
const POPULATION_BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Options for historical cube population.
#[derive(Clone, Debug, Default)]
pub struct PopulateOptions {
    /// Defaults to the earliest ledger date (of the scoped account, when
    /// one is given).
    pub start_date: Option<NaiveDate>,
    /// Defaults to today.
    pub end_date: Option<NaiveDate>,
    /// Wipe the user's cube before repopulating.
    pub clear_existing: bool,
    pub batch_size: Option<usize>,
    /// Restrict population to one account's transactions.
    pub account_id: Option<Uuid>,
}

/// Observability counters returned by [`TrendsService::populate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationSummary {
    pub periods_processed: u64,
    pub records_created: u64,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct TrendsService {
    ledger: DynLedgerQueries,
    cube_queries: DynCubeQueries,
    cube_commands: DynCubeCommands,
    builder: AggregationBuilder,
}

impl TrendsService {
    pub fn new(
        ledger: DynLedgerQueries,
        cube_queries: DynCubeQueries,
        cube_commands: DynCubeCommands,
    ) -> Self {
        let builder = AggregationBuilder::new(ledger.clone(), cube_commands.clone());

        Self {
            ledger,
            cube_queries,
            cube_commands,
            builder,
        }
    }

    // Ledger-mutation hooks.

    /// React to a newly inserted ledger transaction. Best-effort: failures
    /// are logged and never surfaced to the mutation path.
    pub async fn on_transaction_inserted(&self, transaction: &TransactionSnapshot) {
        let targets = deltas::snapshot_targets(transaction);
        self.regenerate_best_effort(targets, "insert").await;
    }

    /// React to a deleted ledger transaction, removing its contribution.
    pub async fn on_transaction_deleted(&self, transaction: &TransactionSnapshot) {
        let targets = deltas::snapshot_targets(transaction);
        self.regenerate_best_effort(targets, "delete").await;
    }

    /// React to an in-place edit of one transaction.
    ///
    /// Date edits cannot be applied incrementally and return
    /// [`TrendsError::UnsupportedFieldChange`] synchronously so the caller
    /// can decompose them into a delete followed by an insert. All other
    /// failures are logged and swallowed.
    pub async fn on_transaction_updated(
        &self,
        old: &TransactionSnapshot,
        new: &TransactionSnapshot,
    ) -> Result<(), TrendsError> {
        let targets = deltas::single_delta_targets(old, new)?;
        self.regenerate_best_effort(targets, "update").await;

        Ok(())
    }

    /// React to a uniform field change applied to a batch of transactions.
    ///
    /// The batch is never diffed per transaction; staleness is derived
    /// from the distinct dimensional combinations present among the
    /// affected rows. Date changes are rejected up front, before any
    /// ledger reads.
    pub async fn on_bulk_transactions_updated(
        &self,
        change: &BulkChange,
    ) -> Result<(), TrendsError> {
        if change
            .changes
            .iter()
            .any(|field_change| matches!(field_change, FieldChange::Date))
        {
            return Err(TrendsError::UnsupportedFieldChange("date"));
        }

        match self.bulk_targets(change).await {
            Ok(targets) => self.regenerate_best_effort(targets, "bulk update").await,
            Err(error) => {
                warn!(
                    user_id = %change.user_id,
                    transactions = change.transaction_ids.len(),
                    ?error,
                    "Failed to compute bulk change impact; cube may be stale until the next rebuild."
                );
            }
        }

        Ok(())
    }

    async fn bulk_targets(&self, change: &BulkChange) -> anyhow::Result<Vec<RegenerationTarget>> {
        let existing = self
            .ledger
            .distinct_slices(change.user_id, &change.transaction_ids)
            .await?;

        let date_range = match change.date_range {
            Some(range) => Some(range),
            None => {
                self.ledger
                    .date_bounds_for_ids(change.user_id, &change.transaction_ids)
                    .await?
            }
        };

        let Some(date_range) = date_range else {
            // None of the affected rows exist anymore; nothing to do.
            return Ok(Vec::new());
        };

        deltas::bulk_targets(change, &existing, date_range).map_err(anyhow::Error::new)
    }

    // Regeneration.

    /// Regenerate the given coordinates: deduplicate, group by period
    /// window, delete each group's stale slices, and rebuild exactly those
    /// slices.
    ///
    /// A failing window is logged and does not stop the remaining
    /// windows; the first error is returned once the batch has been
    /// attempted in full.
    pub async fn regenerate(&self, targets: Vec<RegenerationTarget>) -> anyhow::Result<()> {
        let targets = deltas::dedupe_targets(targets);

        let mut groups: HashMap<(Uuid, Period), Vec<CubeSlice>> = HashMap::new();
        for target in targets {
            groups
                .entry((target.user_id, target.period))
                .or_default()
                .push(target.slice);
        }

        let mut first_error = None;

        for ((user_id, period), slices) in groups {
            let result = self.regenerate_window(user_id, &period, slices).await;

            if let Err(error) = result {
                error!(
                    %user_id,
                    period_type = period.period_type.as_str(),
                    period_start = %period.start,
                    ?error,
                    "Failed to regenerate cube window."
                );

                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn regenerate_window(
        &self,
        user_id: Uuid,
        period: &Period,
        slices: Vec<CubeSlice>,
    ) -> anyhow::Result<()> {
        self.cube_commands
            .delete_slices(user_id, period, &slices)
            .await?;

        self.builder
            .build_period(user_id, period, &BuildScope::Slices(slices))
            .await?;

        Ok(())
    }

    async fn regenerate_best_effort(&self, targets: Vec<RegenerationTarget>, operation: &str) {
        if let Err(error) = self.regenerate(targets).await {
            warn!(
                operation,
                ?error,
                "Cube maintenance failed; the ledger mutation is unaffected."
            );
        }
    }

    /// Rebuild every native window covering `date` from scratch. Unlike
    /// the mutation hooks this is a direct maintenance call, so failures
    /// propagate.
    pub async fn rebuild_period(&self, user_id: Uuid, date: NaiveDate) -> anyhow::Result<u64> {
        let mut records_created = 0;

        for &period_type in NATIVE_PERIOD_TYPES.iter() {
            let period = Period::containing(date, period_type);

            self.cube_commands.delete_period(user_id, &period).await?;
            records_created += self
                .builder
                .build_period(user_id, &period, &BuildScope::Full)
                .await?;
        }

        Ok(records_created)
    }

    // Historical population.

    /// Populate the cube for every native period in a date range.
    ///
    /// Population has no prior cube state to preserve, so each period is
    /// built unscoped (or scoped to one account when requested). Work is
    /// batched with a short pause between batches, individual period
    /// failures are logged and skipped, and re-running after an
    /// interruption is safe because duplicate coordinates are no-ops.
    pub async fn populate(
        &self,
        user_id: Uuid,
        options: PopulateOptions,
    ) -> anyhow::Result<PopulationSummary> {
        let started = Instant::now();

        if options.clear_existing {
            self.cube_commands.clear(user_id).await?;
        }

        let start_date = match options.start_date {
            Some(date) => Some(date),
            None => self
                .ledger
                .date_bounds(user_id, options.account_id)
                .await?
                .map(|(earliest, _)| earliest),
        };

        let Some(start_date) = start_date else {
            info!(%user_id, "No ledger rows to populate from.");

            return Ok(PopulationSummary {
                elapsed: started.elapsed(),
                ..Default::default()
            });
        };

        let end_date = options
            .end_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let mut periods = Vec::new();
        for &period_type in NATIVE_PERIOD_TYPES.iter() {
            periods.extend(Period::covering(start_date, end_date, period_type));
        }

        let scope = match options.account_id {
            Some(account_id) => BuildScope::Account(account_id),
            None => BuildScope::Full,
        };
        let batch_size = options.batch_size.unwrap_or(POPULATION_BATCH_SIZE).max(1);

        let mut summary = PopulationSummary::default();
        let batch_count = periods.chunks(batch_size).len();

        for (batch_index, batch) in periods.chunks(batch_size).enumerate() {
            for period in batch {
                match self.builder.build_period(user_id, period, &scope).await {
                    Ok(created) => {
                        summary.periods_processed += 1;
                        summary.records_created += created;
                    }
                    Err(error) => {
                        // Best-effort: a failed period can be filled in by
                        // re-running the population later.
                        error!(
                            %user_id,
                            period_type = period.period_type.as_str(),
                            period_start = %period.start,
                            ?error,
                            "Failed to populate period; continuing."
                        );
                    }
                }
            }

            if batch_index + 1 < batch_count {
                tokio::time::sleep(POPULATION_BATCH_PAUSE).await;
            }
        }

        summary.elapsed = started.elapsed();

        info!(
            %user_id,
            periods = summary.periods_processed,
            records = summary.records_created,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Populated cube."
        );

        Ok(summary)
    }

    /// Wipe one user's cube.
    pub async fn clear_all(&self, user_id: Uuid) -> anyhow::Result<u64> {
        self.cube_commands.clear(user_id).await
    }

    // Read API.

    /// Trend records for the filter, ordered by period start, then
    /// category, then account.
    ///
    /// Native period types come straight off the store. Derived types are
    /// folded on the fly from their underlying native rows, using the same
    /// boundary math the write side uses.
    pub async fn get_trends(
        &self,
        user_id: Uuid,
        filter: &TrendsFilter,
    ) -> anyhow::Result<Vec<CubeRecord>> {
        if filter.period_type.is_native() {
            return self
                .cube_queries
                .get_records(&cube_filter(user_id, filter, filter.period_type, None))
                .await;
        }

        // Widen the fetch to whole derived windows so every bucket is
        // complete.
        let window_start = Period::containing(filter.start_date, filter.period_type).start;
        let window_end = Period::containing(filter.end_date, filter.period_type).end
            - chrono::Duration::days(1);

        let native_records = self
            .cube_queries
            .get_records(&cube_filter(
                user_id,
                filter,
                filter.period_type.underlying(),
                Some((window_start, window_end)),
            ))
            .await?;

        Ok(fold_into_derived(native_records, filter.period_type))
    }

    /// Totals rolled up over an arbitrary subset of dimensions. Rollups
    /// always read native rows; the period type in the filter selects
    /// which native granularity underlies them.
    pub async fn get_aggregated_totals(
        &self,
        user_id: Uuid,
        group_by: &[GroupByDimension],
        filter: &TrendsFilter,
    ) -> anyhow::Result<Vec<GroupedTotal>> {
        self.cube_queries
            .grouped_totals(
                group_by,
                &cube_filter(user_id, filter, filter.period_type.underlying(), None),
            )
            .await
    }

    /// Operational statistics for one user's cube.
    pub async fn get_statistics(&self, user_id: Uuid) -> anyhow::Result<CubeStatistics> {
        self.cube_queries.statistics(user_id).await
    }
}

fn cube_filter(
    user_id: Uuid,
    filter: &TrendsFilter,
    period_type: PeriodType,
    date_range: Option<(NaiveDate, NaiveDate)>,
) -> CubeFilter {
    let (start_date, end_date) = date_range.unwrap_or((filter.start_date, filter.end_date));

    CubeFilter {
        user_id,
        period_type,
        start_date,
        end_date,
        kind: filter.kind,
        category_ids: filter.category_ids.clone(),
        account_ids: filter.account_ids.clone(),
        recurring: filter.recurring,
    }
}

/// Fold native records into derived-period buckets by summing totals and
/// counts within each derived window.
fn fold_into_derived(records: Vec<CubeRecord>, period_type: PeriodType) -> Vec<CubeRecord> {
    type BucketKey = (
        NaiveDate,
        super::domain::TransactionKind,
        Option<Uuid>,
        Uuid,
        bool,
    );

    let mut buckets: HashMap<BucketKey, CubeRecord> = HashMap::new();

    for record in records {
        let period = Period::containing(record.period_start, period_type);
        let key = (
            period.start,
            record.kind,
            record.category_id,
            record.account_id,
            record.recurring,
        );

        let (total, count) = (record.total, record.count);

        buckets
            .entry(key)
            .and_modify(|bucket| {
                bucket.total += total;
                bucket.count += count;
            })
            .or_insert(CubeRecord {
                period_type,
                period_start: period.start,
                period_end: period.end,
                ..record
            });
    }

    let mut folded: Vec<CubeRecord> = buckets.into_values().collect();
    folded.sort_by_key(|record| (record.period_start, record.category_id, record.account_id));

    folded
}
