//! HTTP surface for the trends engine.
//!
//! Each exposed service operation maps to a single idempotent call.
//! Authentication is handled upstream; requests carry the owning user's
//! ID directly.

mod handlers;
mod reps;

pub use handlers::routes;
