use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    periods::PeriodType,
    trends::{
        domain::{
            CubeRecord, CubeStatistics, GroupByDimension, GroupedTotal, TransactionKind,
            TrendsFilter,
        },
        services::{PopulateOptions, PopulationSummary},
    },
};

#[derive(Serialize)]
pub struct ResourceCollection<T: Serialize> {
    pub items: Vec<T>,
}

fn parse_uuid_list(raw: &str) -> Result<Vec<Uuid>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part).map_err(|_| format!("{part:?} is not a valid UUID."))
        })
        .collect()
}

fn parse_kind(raw: &str) -> Result<TransactionKind, String> {
    TransactionKind::try_from(raw)
        .map_err(|_| format!("{raw:?} is not a valid transaction kind."))
}

#[derive(Deserialize)]
pub struct TrendsParams {
    pub user_id: Uuid,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub kind: Option<String>,
    /// Comma-separated UUID list.
    pub category_ids: Option<String>,
    /// Comma-separated UUID list.
    pub account_ids: Option<String>,
    pub recurring: Option<bool>,
}

impl TrendsParams {
    pub fn filter(&self) -> Result<TrendsFilter, String> {
        Ok(TrendsFilter {
            period_type: self.period_type,
            start_date: self.start_date,
            end_date: self.end_date,
            kind: self.kind.as_deref().map(parse_kind).transpose()?,
            category_ids: self
                .category_ids
                .as_deref()
                .map(parse_uuid_list)
                .transpose()?,
            account_ids: self
                .account_ids
                .as_deref()
                .map(parse_uuid_list)
                .transpose()?,
            recurring: self.recurring,
        })
    }
}

#[derive(Deserialize)]
pub struct TotalsParams {
    pub user_id: Uuid,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub kind: Option<String>,
    pub category_ids: Option<String>,
    pub account_ids: Option<String>,
    pub recurring: Option<bool>,
    /// Comma-separated dimension list, e.g. `period_start,category`.
    pub group_by: String,
}

impl TotalsParams {
    pub fn filter(&self) -> Result<TrendsFilter, String> {
        TrendsParams {
            user_id: self.user_id,
            period_type: self.period_type,
            start_date: self.start_date,
            end_date: self.end_date,
            kind: self.kind.clone(),
            category_ids: self.category_ids.clone(),
            account_ids: self.account_ids.clone(),
            recurring: self.recurring,
        }
        .filter()
    }

    pub fn dimensions(&self) -> Result<Vec<GroupByDimension>, String> {
        self.group_by
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part {
                "period_start" => Ok(GroupByDimension::PeriodStart),
                "kind" => Ok(GroupByDimension::Kind),
                "category" => Ok(GroupByDimension::Category),
                "account" => Ok(GroupByDimension::Account),
                "recurring" => Ok(GroupByDimension::Recurring),
                other => Err(format!("{other:?} is not a valid grouping dimension.")),
            })
            .collect()
    }
}

#[derive(Deserialize)]
pub struct UserParams {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct PopulateRequest {
    pub user_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub clear_existing: bool,
    pub batch_size: Option<usize>,
    pub account_id: Option<Uuid>,
}

impl From<&PopulateRequest> for PopulateOptions {
    fn from(request: &PopulateRequest) -> Self {
        Self {
            start_date: request.start_date,
            end_date: request.end_date,
            clear_existing: request.clear_existing,
            batch_size: request.batch_size,
            account_id: request.account_id,
        }
    }
}

/// Monetary fields are rendered as strings so clients are never tempted
/// into binary floating point.
#[derive(Serialize)]
pub struct CubeRecordRep {
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub kind: &'static str,
    pub category_id: Option<Uuid>,
    pub account_id: Uuid,
    pub recurring: bool,
    pub total: String,
    pub average: String,
    pub count: i64,
}

impl From<&CubeRecord> for CubeRecordRep {
    fn from(record: &CubeRecord) -> Self {
        Self {
            period_type: record.period_type,
            period_start: record.period_start,
            period_end: record.period_end,
            kind: record.kind.as_str(),
            category_id: record.category_id,
            account_id: record.account_id,
            recurring: record.recurring,
            total: record.total.to_string(),
            average: record.average().to_string(),
            count: record.count,
        }
    }
}

#[derive(Serialize)]
pub struct GroupedTotalRep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring: Option<bool>,
    pub total: String,
    pub count: i64,
}

impl From<&GroupedTotal> for GroupedTotalRep {
    fn from(total: &GroupedTotal) -> Self {
        Self {
            period_start: total.period_start,
            kind: total.kind.map(TransactionKind::as_str),
            category_id: total.category_id,
            account_id: total.account_id,
            recurring: total.recurring,
            total: total.total.to_string(),
            count: total.count,
        }
    }
}

#[derive(Serialize)]
pub struct StatisticsRep {
    pub total_rows: i64,
    pub weekly_rows: i64,
    pub monthly_rows: i64,
    pub earliest_period_start: Option<NaiveDate>,
    pub latest_period_end: Option<NaiveDate>,
    pub distinct_accounts: i64,
    pub distinct_categories: i64,
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&CubeStatistics> for StatisticsRep {
    fn from(statistics: &CubeStatistics) -> Self {
        Self {
            total_rows: statistics.total_rows,
            weekly_rows: statistics.weekly_rows,
            monthly_rows: statistics.monthly_rows,
            earliest_period_start: statistics.earliest_period_start,
            latest_period_end: statistics.latest_period_end,
            distinct_accounts: statistics.distinct_accounts,
            distinct_categories: statistics.distinct_categories,
            last_updated: statistics.last_updated,
        }
    }
}

#[derive(Serialize)]
pub struct PopulationSummaryRep {
    pub periods_processed: u64,
    pub records_created: u64,
    pub elapsed_ms: u64,
}

impl From<&PopulationSummary> for PopulationSummaryRep {
    fn from(summary: &PopulationSummary) -> Self {
        Self {
            periods_processed: summary.periods_processed,
            records_created: summary.records_created,
            elapsed_ms: summary.elapsed.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uuid_list_parsing() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let parsed = parse_uuid_list(&format!("{first}, {second}")).unwrap();

        assert_eq!(vec![first, second], parsed);
    }

    #[test]
    fn invalid_uuid_list_is_rejected() {
        assert!(parse_uuid_list("not-a-uuid").is_err());
    }

    #[test]
    fn group_by_dimension_parsing() {
        let params = TotalsParams {
            user_id: Uuid::new_v4(),
            period_type: PeriodType::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            kind: None,
            category_ids: None,
            account_ids: None,
            recurring: None,
            group_by: "period_start,category".to_string(),
        };

        assert_eq!(
            vec![GroupByDimension::PeriodStart, GroupByDimension::Category],
            params.dimensions().unwrap()
        );
        assert!(matches!(
            TotalsParams {
                group_by: "payee".to_string(),
                ..params
            }
            .dimensions(),
            Err(_)
        ));
    }
}
