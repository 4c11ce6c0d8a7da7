//! SQLite-backed change log.
//!
//! The `db_events` table is append-only from the feed's point of view:
//! [`SqliteEventLog`] reads forward by id and, when retention is enabled,
//! deletes rows past their age limit. Writers own everything else.

pub mod db;
pub mod error;
pub mod log;

pub use error::{Result, StoreError};
pub use log::SqliteEventLog;
