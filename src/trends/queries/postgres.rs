use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, Postgres, QueryBuilder, Row};
use tracing::trace;
use uuid::Uuid;

use crate::{
    database::PostgresConnection,
    periods::{Period, PeriodType},
    trends::{domain, models},
};

use super::{BuildScope, CubeFilter, CubeQueries, LedgerQueries};

/// Append `AND (<slice> OR <slice> OR ...)` for the named dimensional
/// slices. Every value is bound; nothing is interpolated into the SQL
/// text.
fn push_slice_conditions(
    query_builder: &mut QueryBuilder<'_, Postgres>,
    column_prefix: &str,
    slices: &[domain::CubeSlice],
) {
    if slices.is_empty() {
        // A regeneration scoped to zero slices matches nothing.
        query_builder.push(" AND FALSE");
        return;
    }

    query_builder.push(" AND (");

    for (index, slice) in slices.iter().enumerate() {
        if index > 0 {
            query_builder.push(" OR ");
        }

        query_builder
            .push("(")
            .push(column_prefix)
            .push("kind = ")
            .push_bind(slice.kind.as_str())
            .push(" AND ")
            .push(column_prefix)
            .push("category_id IS NOT DISTINCT FROM ")
            .push_bind(slice.category_id)
            .push(" AND ")
            .push(column_prefix)
            .push("is_recurring = ")
            .push_bind(slice.recurring)
            .push(")");
    }

    query_builder.push(")");
}

#[async_trait]
impl LedgerQueries for PostgresConnection {
    async fn aggregate_period(
        &self,
        user_id: Uuid,
        period: &Period,
        scope: &BuildScope,
    ) -> Result<Vec<domain::CubeRecord>> {
        trace!(%user_id, ?period, "Aggregating ledger rows for period.");

        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r#"
            SELECT t.kind, t.category_id, t.account_id, t.is_recurring,
                SUM(t.amount) AS total_amount,
                COUNT(*) AS transaction_count
            FROM "transaction" t
            WHERE t.user_id = "#,
        );
        query_builder
            .push_bind(user_id)
            .push(" AND t.date >= ")
            .push_bind(period.start)
            .push(" AND t.date < ")
            .push_bind(period.end);

        match scope {
            BuildScope::Full => (),
            BuildScope::Account(account_id) => {
                query_builder
                    .push(" AND t.account_id = ")
                    .push_bind(*account_id);
            }
            BuildScope::Slices(slices) => {
                push_slice_conditions(&mut query_builder, "t.", slices);
            }
        }

        query_builder.push(" GROUP BY t.kind, t.category_id, t.account_id, t.is_recurring");

        query_builder
            .build()
            .fetch_all(&**self)
            .await?
            .iter()
            .map(models::LedgerAggregateRow::from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?
            .into_iter()
            .map(|row| row.into_record(user_id, period))
            .collect()
    }

    async fn distinct_slices(
        &self,
        user_id: Uuid,
        transaction_ids: &[Uuid],
    ) -> Result<Vec<domain::CubeSlice>> {
        let rows = sqlx::query_as::<_, models::SliceRow>(
            r#"
            SELECT DISTINCT t.kind, t.category_id, t.is_recurring
            FROM "transaction" t
            WHERE t.user_id = $1 AND t.id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(transaction_ids)
        .fetch_all(&**self)
        .await?;

        rows.into_iter().map(domain::CubeSlice::try_from).collect()
    }

    async fn date_bounds(
        &self,
        user_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r#"
            SELECT MIN(t.date), MAX(t.date)
            FROM "transaction" t
            WHERE t.user_id = "#,
        );
        query_builder.push_bind(user_id);

        if let Some(account_id) = account_id {
            query_builder
                .push(" AND t.account_id = ")
                .push_bind(account_id);
        }

        let row = query_builder.build().fetch_one(&**self).await?;

        let earliest: Option<NaiveDate> = row.try_get(0)?;
        let latest: Option<NaiveDate> = row.try_get(1)?;

        Ok(earliest.zip(latest))
    }

    async fn date_bounds_for_ids(
        &self,
        user_id: Uuid,
        transaction_ids: &[Uuid],
    ) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(t.date), MAX(t.date)
            FROM "transaction" t
            WHERE t.user_id = $1 AND t.id = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(transaction_ids)
        .fetch_one(&**self)
        .await?;

        let earliest: Option<NaiveDate> = row.try_get(0)?;
        let latest: Option<NaiveDate> = row.try_get(1)?;

        Ok(earliest.zip(latest))
    }
}

const CUBE_COLUMNS: &str = r#"
    user_id, period_type, period_start, period_end, kind,
    category_id, account_id, is_recurring, total_amount, transaction_count
"#;

/// Apply the shared cube-row filter conditions. The query must already
/// have a `WHERE` clause open.
fn push_cube_filter(query_builder: &mut QueryBuilder<'_, Postgres>, filter: &CubeFilter) {
    query_builder
        .push("user_id = ")
        .push_bind(filter.user_id)
        .push(" AND period_type = ")
        .push_bind(filter.period_type.as_str())
        .push(" AND period_end > ")
        .push_bind(filter.start_date)
        .push(" AND period_start <= ")
        .push_bind(filter.end_date);

    if let Some(kind) = filter.kind {
        query_builder.push(" AND kind = ").push_bind(kind.as_str());
    }

    if let Some(category_ids) = filter.category_ids.clone() {
        query_builder
            .push(" AND category_id = ANY(")
            .push_bind(category_ids)
            .push(")");
    }

    if let Some(account_ids) = filter.account_ids.clone() {
        query_builder
            .push(" AND account_id = ANY(")
            .push_bind(account_ids)
            .push(")");
    }

    if let Some(recurring) = filter.recurring {
        query_builder
            .push(" AND is_recurring = ")
            .push_bind(recurring);
    }
}

fn group_by_column(dimension: domain::GroupByDimension) -> &'static str {
    match dimension {
        domain::GroupByDimension::PeriodStart => "period_start",
        domain::GroupByDimension::Kind => "kind",
        domain::GroupByDimension::Category => "category_id",
        domain::GroupByDimension::Account => "account_id",
        domain::GroupByDimension::Recurring => "is_recurring",
    }
}

#[async_trait]
impl CubeQueries for PostgresConnection {
    async fn get_records(&self, filter: &CubeFilter) -> Result<Vec<domain::CubeRecord>> {
        trace!(user_id = %filter.user_id, period_type = filter.period_type.as_str(), "Querying cube records.");

        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
        query_builder
            .push(CUBE_COLUMNS)
            .push(" FROM trends_cube WHERE ");
        push_cube_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY period_start, category_id, account_id");

        query_builder
            .build()
            .fetch_all(&**self)
            .await?
            .iter()
            .map(models::CubeRow::from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?
            .into_iter()
            .map(domain::CubeRecord::try_from)
            .collect()
    }

    async fn grouped_totals(
        &self,
        group_by: &[domain::GroupByDimension],
        filter: &CubeFilter,
    ) -> Result<Vec<domain::GroupedTotal>> {
        // Column names come from a fixed whitelist; only values are bound.
        let mut columns = Vec::with_capacity(group_by.len());
        for &dimension in group_by {
            let column = group_by_column(dimension);
            if !columns.contains(&column) {
                columns.push(column);
            }
        }

        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
        for column in columns.iter() {
            query_builder.push(*column).push(", ");
        }
        query_builder.push(
            r#"
            SUM(total_amount) AS total_amount,
            SUM(transaction_count) AS transaction_count
            FROM trends_cube WHERE "#,
        );
        push_cube_filter(&mut query_builder, filter);

        if !columns.is_empty() {
            query_builder.push(" GROUP BY ");
            for (index, column) in columns.iter().enumerate() {
                if index > 0 {
                    query_builder.push(", ");
                }
                query_builder.push(*column);
            }
            query_builder.push(" ORDER BY ");
            for (index, column) in columns.iter().enumerate() {
                if index > 0 {
                    query_builder.push(", ");
                }
                query_builder.push(*column);
            }
        }

        let rows = query_builder.build().fetch_all(&**self).await?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in rows {
            let mut grouped = domain::GroupedTotal {
                period_start: None,
                kind: None,
                category_id: None,
                account_id: None,
                recurring: None,
                total: row.try_get("total_amount")?,
                count: row.try_get("transaction_count")?,
            };

            for column in columns.iter() {
                match *column {
                    "period_start" => grouped.period_start = Some(row.try_get("period_start")?),
                    "kind" => {
                        let kind: String = row.try_get("kind")?;
                        grouped.kind = Some(domain::TransactionKind::try_from(kind.as_str())?);
                    }
                    "category_id" => grouped.category_id = Some(row.try_get("category_id")?),
                    "account_id" => grouped.account_id = Some(row.try_get("account_id")?),
                    "is_recurring" => grouped.recurring = Some(row.try_get("is_recurring")?),
                    _ => unreachable!("column list is built from the dimension whitelist"),
                }
            }

            totals.push(grouped);
        }

        Ok(totals)
    }

    async fn statistics(&self, user_id: Uuid) -> Result<domain::CubeStatistics> {
        let row = sqlx::query_as::<_, models::StatisticsRow>(
            r#"
            SELECT
                COUNT(*) AS total_rows,
                COUNT(*) FILTER (WHERE period_type = $2) AS weekly_rows,
                COUNT(*) FILTER (WHERE period_type = $3) AS monthly_rows,
                MIN(period_start) AS earliest_period_start,
                MAX(period_end) AS latest_period_end,
                COUNT(DISTINCT account_id) AS distinct_accounts,
                COUNT(DISTINCT category_id) AS distinct_categories,
                MAX(created_at) AS last_updated
            FROM trends_cube
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(PeriodType::Weekly.as_str())
        .bind(PeriodType::Monthly.as_str())
        .fetch_one(&**self)
        .await?;

        Ok(row.into())
    }
}
