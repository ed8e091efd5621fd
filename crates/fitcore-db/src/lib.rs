//! Database layer for the FitCore webhook subsystem.
//!
//! Provides the `WebhookSubscription` and `WebhookDelivery` models with
//! type-safe PostgreSQL queries, plus embedded schema migrations. The
//! delivery ledger queries in this crate are the single source of truth for
//! delivery state transitions; concurrent dispatcher workers coordinate
//! exclusively through the atomic claim query on `WebhookDelivery`.

pub mod error;
pub mod migrations;
pub mod models;

pub use error::DbError;
pub use migrations::run_migrations;
