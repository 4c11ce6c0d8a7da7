//! Change-feed engine: polls an [`EventLog`](feedline_core::EventLog)
//! forward from a cursor and fans every new event out to the live
//! subscribers.
//!
//! One [`EventSource`] task owns the cursor. Connections create a
//! [`SubscriberHandle`], register it, and drain its [`Outbox`] into their
//! transport; the [`Broadcaster`] drops any subscriber whose send fails.

pub mod broadcaster;
pub mod cursor;
pub mod handle;
pub mod registry;
pub mod source;

#[cfg(test)]
mod testing;

pub use broadcaster::{BatchReport, Broadcaster};
pub use cursor::Cursor;
pub use handle::{Delivery, DeliveryFailure, Outbox, SubscriberHandle};
pub use registry::{Registration, SubscriberRegistry};
pub use source::{EventSource, PollOutcome};
