//! Storage boundary for blood-bank state.
//!
//! One trait, two backends: an in-memory single-node store (per-record mutex)
//! and a Postgres store (row locks inside a transaction).

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
pub use r#trait::{BloodBankStore, Provisioned, StoreError};
