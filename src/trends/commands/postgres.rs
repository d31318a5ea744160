use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    database::PostgresConnection,
    periods::Period,
    trends::domain::{CubeRecord, CubeSlice},
};

use super::CubeCommands;

#[async_trait]
impl CubeCommands for PostgresConnection {
    async fn insert_records(&self, records: &[CubeRecord]) -> anyhow::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO trends_cube (
                user_id, period_type, period_start, period_end, kind,
                category_id, account_id, is_recurring, total_amount,
                transaction_count
            )"#,
        );

        query_builder.push_values(records, |mut b, record| {
            b.push_bind(record.user_id)
                .push_bind(record.period_type.as_str())
                .push_bind(record.period_start)
                .push_bind(record.period_end)
                .push_bind(record.kind.as_str())
                .push_bind(record.category_id)
                .push_bind(record.account_id)
                .push_bind(record.recurring)
                .push_bind(record.total)
                .push_bind(record.count);
        });

        // Duplicate coordinates are no-ops; the existing row is already
        // current because rebuilds are idempotent.
        query_builder.push(" ON CONFLICT DO NOTHING");

        let result = query_builder.build().execute(&**self).await?;
        debug!(
            attempted = records.len(),
            inserted = result.rows_affected(),
            "Inserted cube records."
        );

        Ok(result.rows_affected())
    }

    async fn delete_slices(
        &self,
        user_id: Uuid,
        period: &Period,
        slices: &[CubeSlice],
    ) -> anyhow::Result<u64> {
        if slices.is_empty() {
            return Ok(0);
        }

        let mut query_builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("DELETE FROM trends_cube WHERE user_id = ");
        query_builder
            .push_bind(user_id)
            .push(" AND period_type = ")
            .push_bind(period.period_type.as_str())
            .push(" AND period_start = ")
            .push_bind(period.start)
            .push(" AND (");

        for (index, slice) in slices.iter().enumerate() {
            if index > 0 {
                query_builder.push(" OR ");
            }

            query_builder
                .push("(kind = ")
                .push_bind(slice.kind.as_str())
                .push(" AND category_id IS NOT DISTINCT FROM ")
                .push_bind(slice.category_id)
                .push(" AND is_recurring = ")
                .push_bind(slice.recurring)
                .push(")");
        }

        query_builder.push(")");

        let result = query_builder.build().execute(&**self).await?;
        debug!(
            %user_id,
            period_start = %period.start,
            slices = slices.len(),
            rows = result.rows_affected(),
            "Deleted stale cube slices."
        );

        Ok(result.rows_affected())
    }

    async fn delete_period(&self, user_id: Uuid, period: &Period) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM trends_cube
            WHERE user_id = $1 AND period_type = $2 AND period_start = $3
            "#,
        )
        .bind(user_id)
        .bind(period.period_type.as_str())
        .bind(period.start)
        .execute(&**self)
        .await?;

        debug!(
            %user_id,
            period_start = %period.start,
            rows = result.rows_affected(),
            "Deleted cube period."
        );

        Ok(result.rows_affected())
    }

    async fn clear(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM trends_cube WHERE user_id = $1")
            .bind(user_id)
            .execute(&**self)
            .await?;

        info!(%user_id, rows = result.rows_affected(), "Cleared cube.");

        Ok(result.rows_affected())
    }
}
