//! Change-impact calculation.
//!
//! Given a description of what changed in the ledger, these functions
//! compute the minimal set of cube coordinates that are now stale. They are
//! pure: callers supply the dimensional facts (for bulk changes, the
//! distinct combinations present among the affected rows) and receive
//! regeneration targets back.

use std::collections::HashSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::periods::{Period, NATIVE_PERIOD_TYPES};

use super::{
    domain::{BulkChange, CubeSlice, FieldChange, RegenerationTarget, TransactionSnapshot},
    TrendsError,
};

/// Targets for a single inserted or deleted row: its own slice in each
/// native period covering its date.
pub fn snapshot_targets(transaction: &TransactionSnapshot) -> Vec<RegenerationTarget> {
    NATIVE_PERIOD_TYPES
        .iter()
        .map(|&period_type| RegenerationTarget {
            user_id: transaction.user_id,
            period: Period::containing(transaction.date, period_type),
            slice: transaction.slice(),
        })
        .collect()
}

/// Targets for an in-place edit of a single row.
///
/// Field-by-field diff of the two snapshots. An amount-only change stays in
/// one slice; a dimensional change moves the row between slices, so both
/// the old and the new slice go stale. Date edits are not supported here —
/// the caller must decompose them into a delete of the old snapshot
/// followed by an insert of the new one.
pub fn single_delta_targets(
    old: &TransactionSnapshot,
    new: &TransactionSnapshot,
) -> Result<Vec<RegenerationTarget>, TrendsError> {
    if old.date != new.date {
        return Err(TrendsError::UnsupportedFieldChange("date"));
    }

    let mut slices = vec![old.slice()];
    if new.slice() != old.slice() {
        slices.push(new.slice());
    }

    let mut targets = Vec::with_capacity(slices.len() * NATIVE_PERIOD_TYPES.len());
    for &period_type in NATIVE_PERIOD_TYPES.iter() {
        let period = Period::containing(new.date, period_type);

        for &slice in slices.iter() {
            targets.push(RegenerationTarget {
                user_id: new.user_id,
                period,
                slice,
            });
        }
    }

    Ok(targets)
}

/// Targets for a uniform field change applied to a batch of rows.
///
/// Never diffs per transaction. Instead it reasons about the batch in
/// aggregate: `existing` holds the distinct (kind, category, recurring)
/// combinations present among the affected rows, and each changed field
/// invalidates old and new dimensional values crossed with the other
/// dimensions observed in the batch. The result is crossed with every
/// native period covering `date_range`.
pub fn bulk_targets(
    change: &BulkChange,
    existing: &[CubeSlice],
    date_range: (NaiveDate, NaiveDate),
) -> Result<Vec<RegenerationTarget>, TrendsError> {
    let mut stale_slices: HashSet<CubeSlice> = HashSet::new();

    for field_change in change.changes.iter() {
        match *field_change {
            FieldChange::Category { old, new } => {
                for slice in existing {
                    for category_id in [old, new] {
                        stale_slices.insert(CubeSlice {
                            kind: slice.kind,
                            category_id,
                            recurring: slice.recurring,
                        });
                    }
                }
            }
            FieldChange::Kind { old, new } => {
                for slice in existing {
                    for kind in [old, new] {
                        stale_slices.insert(CubeSlice { kind, ..*slice });
                    }
                }
            }
            FieldChange::Recurring { old, new } => {
                for slice in existing {
                    for recurring in [old, new] {
                        stale_slices.insert(CubeSlice {
                            recurring,
                            ..*slice
                        });
                    }
                }
            }
            // Rows stay in their slices; accounts are not part of the
            // slice key, and amount edits introduce no new coordinates.
            FieldChange::Account { .. } | FieldChange::Amount => {
                stale_slices.extend(existing.iter().copied());
            }
            FieldChange::Date => {
                return Err(TrendsError::UnsupportedFieldChange("date"));
            }
        }
    }

    let (range_start, range_end) = date_range;
    let mut targets = Vec::new();

    for &period_type in NATIVE_PERIOD_TYPES.iter() {
        for period in Period::covering(range_start, range_end, period_type) {
            for &slice in stale_slices.iter() {
                targets.push(RegenerationTarget {
                    user_id: change.user_id,
                    period,
                    slice,
                });
            }
        }
    }

    Ok(targets)
}

/// Drops exact duplicate targets, keeping first-seen order.
///
/// Equality is the full tuple (user, period type, period start, kind,
/// category, recurring); targets differing only in period start or period
/// type are distinct coordinates and both survive.
pub fn dedupe_targets(targets: Vec<RegenerationTarget>) -> Vec<RegenerationTarget> {
    let mut seen = HashSet::with_capacity(targets.len());

    targets
        .into_iter()
        .filter(|target| seen.insert(*target))
        .collect()
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use crate::{periods::PeriodType, trends::domain::TransactionKind};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(user_id: Uuid, category_id: Option<Uuid>) -> TransactionSnapshot {
        TransactionSnapshot {
            id: Uuid::new_v4(),
            user_id,
            account_id: Uuid::new_v4(),
            category_id,
            amount: dec!(-50),
            date: date(2024, 3, 14),
            kind: TransactionKind::Expense,
            recurring: false,
        }
    }

    #[test]
    fn inserted_row_targets_both_native_periods() {
        let transaction = snapshot(Uuid::new_v4(), Some(Uuid::new_v4()));
        let targets = snapshot_targets(&transaction);

        assert_eq!(2, targets.len());
        assert_eq!(PeriodType::Weekly, targets[0].period.period_type);
        assert_eq!(PeriodType::Monthly, targets[1].period.period_type);

        for target in targets {
            assert!(target.period.contains(transaction.date));
            assert_eq!(transaction.slice(), target.slice);
        }
    }

    #[test]
    fn amount_only_change_stays_in_one_slice() {
        let old = snapshot(Uuid::new_v4(), Some(Uuid::new_v4()));
        let new = TransactionSnapshot {
            amount: dec!(-75),
            ..old.clone()
        };

        let targets = single_delta_targets(&old, &new).unwrap();

        // One slice per native period type.
        assert_eq!(2, targets.len());
        assert!(targets.iter().all(|t| t.slice == old.slice()));
    }

    #[test]
    fn category_change_invalidates_old_and_new_slices() {
        let old = snapshot(Uuid::new_v4(), Some(Uuid::new_v4()));
        let new = TransactionSnapshot {
            category_id: Some(Uuid::new_v4()),
            ..old.clone()
        };

        let targets = single_delta_targets(&old, &new).unwrap();

        assert_eq!(4, targets.len());
        for period_type in NATIVE_PERIOD_TYPES {
            let slices: Vec<_> = targets
                .iter()
                .filter(|t| t.period.period_type == period_type)
                .map(|t| t.slice)
                .collect();
            assert!(slices.contains(&old.slice()));
            assert!(slices.contains(&new.slice()));
        }
    }

    #[test]
    fn account_only_change_targets_the_shared_slice_once() {
        let old = snapshot(Uuid::new_v4(), Some(Uuid::new_v4()));
        let new = TransactionSnapshot {
            account_id: Uuid::new_v4(),
            ..old.clone()
        };

        let targets = single_delta_targets(&old, &new).unwrap();

        // The slice key has no account, so old and new coordinates
        // coincide and one regeneration covers both accounts.
        assert_eq!(2, targets.len());
    }

    #[test]
    fn date_change_is_rejected() {
        let old = snapshot(Uuid::new_v4(), None);
        let new = TransactionSnapshot {
            date: date(2024, 3, 15),
            ..old.clone()
        };

        let error = single_delta_targets(&old, &new).unwrap_err();

        assert!(matches!(error, TrendsError::UnsupportedFieldChange("date")));
    }

    #[test]
    fn bulk_category_change_scales_with_dimensions_not_rows() {
        // 500 rows, but only two distinct (kind, recurring) combinations,
        // all inside March 2024.
        let user_id = Uuid::new_v4();
        let old_category = Uuid::new_v4();
        let new_category = Uuid::new_v4();

        let existing = vec![
            CubeSlice {
                kind: TransactionKind::Expense,
                category_id: Some(old_category),
                recurring: false,
            },
            CubeSlice {
                kind: TransactionKind::Expense,
                category_id: Some(old_category),
                recurring: true,
            },
        ];

        let change = BulkChange {
            user_id,
            transaction_ids: (0..500).map(|_| Uuid::new_v4()).collect(),
            changes: vec![FieldChange::Category {
                old: Some(old_category),
                new: Some(new_category),
            }],
            date_range: None,
        };

        let targets =
            bulk_targets(&change, &existing, (date(2024, 3, 1), date(2024, 3, 31))).unwrap();

        // {old, new} categories x {recurring, not} = 4 slices. March 2024
        // intersects 1 monthly and 5 weekly periods.
        let monthly: Vec<_> = targets
            .iter()
            .filter(|t| t.period.period_type == PeriodType::Monthly)
            .collect();
        let weekly: Vec<_> = targets
            .iter()
            .filter(|t| t.period.period_type == PeriodType::Weekly)
            .collect();

        assert_eq!(4, monthly.len());
        assert_eq!(4 * 5, weekly.len());

        let categories: HashSet<_> = targets.iter().map(|t| t.slice.category_id).collect();
        assert_eq!(
            HashSet::from([Some(old_category), Some(new_category)]),
            categories
        );
    }

    #[test]
    fn bulk_kind_change_crosses_both_kinds_with_existing_categories() {
        let existing = vec![
            CubeSlice {
                kind: TransactionKind::Expense,
                category_id: Some(Uuid::new_v4()),
                recurring: false,
            },
            CubeSlice {
                kind: TransactionKind::Expense,
                category_id: None,
                recurring: false,
            },
        ];

        let change = BulkChange {
            user_id: Uuid::new_v4(),
            transaction_ids: vec![Uuid::new_v4()],
            changes: vec![FieldChange::Kind {
                old: TransactionKind::Expense,
                new: TransactionKind::Income,
            }],
            date_range: None,
        };

        let targets =
            bulk_targets(&change, &existing, (date(2024, 3, 4), date(2024, 3, 4))).unwrap();

        // 2 kinds x 2 categories = 4 slices, one weekly + one monthly
        // period each.
        assert_eq!(8, targets.len());
        assert!(targets
            .iter()
            .any(|t| t.slice.kind == TransactionKind::Income));
    }

    #[test]
    fn bulk_recurring_change_crosses_both_flags_with_existing_slices() {
        let groceries = Uuid::new_v4();
        let existing = vec![
            CubeSlice {
                kind: TransactionKind::Expense,
                category_id: Some(groceries),
                recurring: false,
            },
            CubeSlice {
                kind: TransactionKind::Income,
                category_id: None,
                recurring: false,
            },
        ];

        let change = BulkChange {
            user_id: Uuid::new_v4(),
            transaction_ids: vec![Uuid::new_v4()],
            changes: vec![FieldChange::Recurring {
                old: false,
                new: true,
            }],
            date_range: None,
        };

        let targets =
            bulk_targets(&change, &existing, (date(2024, 3, 4), date(2024, 3, 4))).unwrap();

        // 2 flags x 2 (kind, category) combinations = 4 slices, one weekly
        // + one monthly period each.
        assert_eq!(8, targets.len());

        let flags: HashSet<_> = targets.iter().map(|t| t.slice.recurring).collect();
        assert_eq!(HashSet::from([false, true]), flags);
        for slice in existing {
            assert!(targets
                .iter()
                .any(|t| t.slice == CubeSlice { recurring: true, ..slice }));
        }
    }

    #[test]
    fn bulk_amount_change_introduces_no_new_coordinates() {
        let existing = vec![CubeSlice {
            kind: TransactionKind::Expense,
            category_id: Some(Uuid::new_v4()),
            recurring: false,
        }];

        let change = BulkChange {
            user_id: Uuid::new_v4(),
            transaction_ids: vec![Uuid::new_v4()],
            changes: vec![FieldChange::Amount],
            date_range: None,
        };

        let targets =
            bulk_targets(&change, &existing, (date(2024, 3, 4), date(2024, 3, 4))).unwrap();

        assert_eq!(2, targets.len());
        assert!(targets.iter().all(|t| t.slice == existing[0]));
    }

    #[test]
    fn bulk_date_change_is_rejected() {
        let change = BulkChange {
            user_id: Uuid::new_v4(),
            transaction_ids: vec![Uuid::new_v4()],
            changes: vec![FieldChange::Date],
            date_range: None,
        };

        let error = bulk_targets(&change, &[], (date(2024, 3, 1), date(2024, 3, 31))).unwrap_err();

        assert!(matches!(error, TrendsError::UnsupportedFieldChange("date")));
    }

    #[test]
    fn dedupe_drops_exact_duplicates_only() {
        let user_id = Uuid::new_v4();
        let slice = CubeSlice {
            kind: TransactionKind::Expense,
            category_id: None,
            recurring: false,
        };

        let weekly = RegenerationTarget {
            user_id,
            period: Period::containing(date(2024, 3, 14), PeriodType::Weekly),
            slice,
        };
        let monthly = RegenerationTarget {
            user_id,
            period: Period::containing(date(2024, 3, 14), PeriodType::Monthly),
            slice,
        };
        let other_week = RegenerationTarget {
            period: Period::containing(date(2024, 3, 21), PeriodType::Weekly),
            ..weekly
        };

        let deduped = dedupe_targets(vec![weekly, monthly, weekly, other_week, monthly]);

        // Same slice under a different period start or period type is a
        // different coordinate.
        assert_eq!(vec![weekly, monthly, other_week], deduped);
    }
}
