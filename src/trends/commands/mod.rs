//! Write-side contracts for the cube store.
//!
//! There is deliberately no update-in-place operation: every mutation is a
//! delete of stale coordinates followed by a fresh insert, which keeps
//! partial updates impossible by construction.

pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::periods::Period;

use super::domain::{CubeRecord, CubeSlice};

pub type DynCubeCommands = Arc<dyn CubeCommands + Send + Sync>;

#[async_trait]
pub trait CubeCommands {
    /// Bulk-insert aggregate rows. Rows whose coordinate already exists
    /// are skipped: an already-current row wins, which makes overlapping
    /// regenerations of the same coordinate safe.
    ///
    /// # Returns
    ///
    /// The number of rows actually inserted.
    async fn insert_records(&self, records: &[CubeRecord]) -> anyhow::Result<u64>;

    /// Delete the rows for the named dimensional slices within one period
    /// window.
    async fn delete_slices(
        &self,
        user_id: Uuid,
        period: &Period,
        slices: &[CubeSlice],
    ) -> anyhow::Result<u64>;

    /// Delete every row in one period window.
    async fn delete_period(&self, user_id: Uuid, period: &Period) -> anyhow::Result<u64>;

    /// Wipe one user's cube entirely.
    async fn clear(&self, user_id: Uuid) -> anyhow::Result<u64>;
}
