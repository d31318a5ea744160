//! The incremental dimensional-aggregation engine.
//!
//! Ledger mutations flow through the change-impact calculator
//! ([`deltas`]) into targeted regeneration of stale cube coordinates
//! ([`services`], [`builder`]); reporting reads come straight off the
//! pre-aggregated store, folding derived period types on the fly.

use thiserror::Error;

pub mod builder;
pub mod commands;
pub mod deltas;
pub mod domain;
pub mod http;
pub mod models;
pub mod queries;
pub mod services;

#[derive(Debug, Error)]
pub enum TrendsError {
    /// The change cannot be applied incrementally. Callers should delete
    /// the old transaction and insert the updated one instead; those two
    /// operations are fully supported.
    #[error("changing the `{0}` field cannot be regenerated incrementally; decompose the edit into a delete followed by an insert")]
    UnsupportedFieldChange(&'static str),
}
