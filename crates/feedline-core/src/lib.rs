//! Shared building blocks for the feedline workspace: configuration,
//! the error type, the event model, and the query seam to the change log.

pub mod config;
pub mod error;
pub mod log;
pub mod types;

pub use config::FeedlineConfig;
pub use error::{FeedlineError, Result};
pub use log::EventLog;
pub use types::{EventRecord, EventRow, SubscriberId};
