//! Canonical reporting period boundaries.
//!
//! All cube rows are bucketed by the periods computed here, and the read
//! side folds native rows into derived periods with the same functions, so
//! this module is the single source of truth for window boundaries.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// The day every weekly period starts on.
///
/// This is a process-wide constant set at compile time. Changing it
/// invalidates every stored weekly row, so it must never vary per call or
/// per user.
pub const WEEK_START: Weekday = Weekday::Mon;

/// Reference date that bi-weekly blocks are counted from. Chosen to fall on
/// [`WEEK_START`] so that every bi-weekly window is the union of two whole
/// weekly windows.
fn biweekly_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2001, 1, 1).unwrap()
}

/// The granularities the engine understands.
///
/// Weekly and Monthly are *native*: cube rows are stored at these
/// granularities. The remaining types are *derived*: they are computed on
/// read by folding native rows and are never persisted.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeriodType {
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    BiAnnual,
    Annual,
}

/// The two granularities that are actually stored.
pub const NATIVE_PERIOD_TYPES: [PeriodType; 2] = [PeriodType::Weekly, PeriodType::Monthly];

impl PeriodType {
    pub fn is_native(self) -> bool {
        matches!(self, Self::Weekly | Self::Monthly)
    }

    /// The native type whose rows are folded to produce this type on read.
    /// Native types underlie themselves.
    pub fn underlying(self) -> PeriodType {
        match self {
            Self::Weekly | Self::BiWeekly => Self::Weekly,
            Self::Monthly | Self::Quarterly | Self::BiAnnual | Self::Annual => Self::Monthly,
        }
    }

    /// Stable identifier used for the `period_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::BiAnnual => "bi-annual",
            Self::Annual => "annual",
        }
    }
}

impl TryFrom<&str> for PeriodType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "weekly" => Ok(Self::Weekly),
            "bi-weekly" => Ok(Self::BiWeekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "bi-annual" => Ok(Self::BiAnnual),
            "annual" => Ok(Self::Annual),
            other => Err(anyhow::anyhow!("unknown period type: {other}")),
        }
    }
}

/// A half-open date window `[start, end)` tagged with its granularity.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Period {
    pub period_type: PeriodType,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// The period of the given type covering `date`.
    ///
    /// Deterministic: any date within a window produces exactly the same
    /// boundaries.
    pub fn containing(date: NaiveDate, period_type: PeriodType) -> Self {
        let (start, end) = match period_type {
            PeriodType::Weekly => {
                let offset = (date.weekday().num_days_from_monday() + 7
                    - WEEK_START.num_days_from_monday())
                    % 7;
                let start = date - Duration::days(i64::from(offset));
                (start, start + Duration::days(7))
            }
            PeriodType::BiWeekly => {
                let block = (date - biweekly_epoch()).num_days().div_euclid(14);
                let start = biweekly_epoch() + Duration::days(block * 14);
                (start, start + Duration::days(14))
            }
            PeriodType::Monthly => {
                let start = first_of_month(date.year(), date.month());
                (start, add_months(start, 1))
            }
            PeriodType::Quarterly => {
                let start = first_of_month(date.year(), (date.month0() / 3) * 3 + 1);
                (start, add_months(start, 3))
            }
            PeriodType::BiAnnual => {
                let start = first_of_month(date.year(), (date.month0() / 6) * 6 + 1);
                (start, add_months(start, 6))
            }
            PeriodType::Annual => {
                let start = first_of_month(date.year(), 1);
                (start, add_months(start, 12))
            }
        };

        Self {
            period_type,
            start,
            end,
        }
    }

    /// Whether `date` falls inside this window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Every period of the given type intersecting the inclusive range
    /// `[range_start, range_end]`, in chronological order.
    pub fn covering(
        range_start: NaiveDate,
        range_end: NaiveDate,
        period_type: PeriodType,
    ) -> Vec<Self> {
        let mut periods = Vec::new();
        let mut current = Self::containing(range_start, period_type);

        while current.start <= range_end {
            periods.push(current);
            current = Self::containing(current.end, period_type);
        }

        periods
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = date.month0() + months;

    first_of_month(
        date.year() + (zero_based / 12) as i32,
        (zero_based % 12) + 1,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_period_starts_on_week_start() {
        // 2024-03-14 is a Thursday.
        let period = Period::containing(date(2024, 3, 14), PeriodType::Weekly);

        assert_eq!(date(2024, 3, 11), period.start);
        assert_eq!(date(2024, 3, 18), period.end);
        assert_eq!(WEEK_START, period.start.weekday());
    }

    #[test]
    fn weekly_period_is_identity_on_week_start() {
        let monday = date(2024, 3, 11);
        let period = Period::containing(monday, PeriodType::Weekly);

        assert_eq!(monday, period.start);
    }

    #[test]
    fn biweekly_boundaries_are_stable_across_trigger_dates() {
        let block = Period::containing(date(2024, 3, 11), PeriodType::BiWeekly);

        for offset in 0..14 {
            let other = Period::containing(block.start + Duration::days(offset), PeriodType::BiWeekly);
            assert_eq!(block, other);
        }

        assert_eq!(14, (block.end - block.start).num_days());
        // Offsets of 14 days from the epoch.
        assert_eq!(0, (block.start - biweekly_epoch()).num_days() % 14);
    }

    #[test]
    fn biweekly_period_is_two_whole_weeks() {
        let biweek = Period::containing(date(2024, 3, 20), PeriodType::BiWeekly);
        let first_week = Period::containing(biweek.start, PeriodType::Weekly);
        let second_week = Period::containing(first_week.end, PeriodType::Weekly);

        assert_eq!(biweek.start, first_week.start);
        assert_eq!(biweek.end, second_week.end);
    }

    #[test]
    fn biweekly_before_epoch() {
        let period = Period::containing(date(2000, 12, 31), PeriodType::BiWeekly);

        assert!(period.contains(date(2000, 12, 31)));
        assert_eq!(biweekly_epoch(), period.end);
    }

    #[test]
    fn monthly_period_is_calendar_month() {
        let period = Period::containing(date(2024, 2, 29), PeriodType::Monthly);

        assert_eq!(date(2024, 2, 1), period.start);
        assert_eq!(date(2024, 3, 1), period.end);
    }

    #[test]
    fn quarters_are_anchored_at_january() {
        let q1 = Period::containing(date(2024, 2, 15), PeriodType::Quarterly);
        let q4 = Period::containing(date(2024, 12, 31), PeriodType::Quarterly);

        assert_eq!(date(2024, 1, 1), q1.start);
        assert_eq!(date(2024, 4, 1), q1.end);
        assert_eq!(date(2024, 10, 1), q4.start);
        assert_eq!(date(2025, 1, 1), q4.end);
    }

    #[test]
    fn biannual_and_annual_group_months() {
        let half = Period::containing(date(2024, 8, 2), PeriodType::BiAnnual);
        let year = Period::containing(date(2024, 8, 2), PeriodType::Annual);

        assert_eq!(date(2024, 7, 1), half.start);
        assert_eq!(date(2025, 1, 1), half.end);
        assert_eq!(date(2024, 1, 1), year.start);
        assert_eq!(date(2025, 1, 1), year.end);
    }

    #[test]
    fn covering_enumerates_all_intersecting_periods() {
        let months = Period::covering(date(2024, 1, 15), date(2024, 3, 2), PeriodType::Monthly);

        assert_eq!(3, months.len());
        assert_eq!(date(2024, 1, 1), months[0].start);
        assert_eq!(date(2024, 3, 1), months[2].start);
    }

    #[test]
    fn covering_single_day_range() {
        let weeks = Period::covering(date(2024, 3, 14), date(2024, 3, 14), PeriodType::Weekly);

        assert_eq!(1, weeks.len());
        assert!(weeks[0].contains(date(2024, 3, 14)));
    }

    #[test]
    fn derived_composition_matches_direct_computation() {
        // Folding monthly periods into a quarter must land on exactly the
        // boundaries computed directly.
        let quarter = Period::containing(date(2024, 5, 10), PeriodType::Quarterly);
        let months = Period::covering(quarter.start, quarter.end - Duration::days(1), PeriodType::Monthly);

        assert_eq!(3, months.len());
        assert_eq!(quarter.start, months[0].start);
        assert_eq!(quarter.end, months[2].end);

        for month in months {
            assert_eq!(
                quarter,
                Period::containing(month.start, PeriodType::Quarterly)
            );
        }
    }
}
