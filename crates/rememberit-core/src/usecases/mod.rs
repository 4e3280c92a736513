//! Use cases
//!
//! - [`upsert`] - Plan inserts and updates for a bulk card import

pub mod upsert;

pub use upsert::{plan_upsert, UpsertAction, UpsertReport};
