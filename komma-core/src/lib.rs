//! Agent task orchestration for komma.
//!
//! Dispatches edit and chat requests to an external assistant through one of
//! two transports, streams its output, records the outcome, and holds the
//! resulting edit for review. Persistence is a WAL-mode SQLite database
//! shared with the host.

pub mod aggregator;
pub mod changelog;
pub mod db;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod prompt;
pub mod review;
pub mod schema;
pub mod session;
pub mod snapshots;
pub mod tiers;
pub mod transport;
pub mod types;
