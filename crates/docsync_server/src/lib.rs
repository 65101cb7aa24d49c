//! # docsync Server
//!
//! Snapshot publisher for docsync live queries.
//!
//! This crate provides:
//! - The downstream `Subscriber` contract (`added`, `changed`, `removed`,
//!   `on_stop`)
//! - `publish_cursor`, bridging a live query to a subscriber
//! - `Publication`, publishing several cursors then marking the
//!   subscription ready
//! - `FrameSubscriber`, encoding notifications as batch frames on a
//!   channel so a replicator can consume them
//!
//! # Architecture
//!
//! ```text
//! DocumentTable ─▶ Cursor (live query) ─▶ ForwardingObserver ─▶ Subscriber
//! ```
//!
//! Forwarded documents are passed by reference and never modified. A
//! publish handle stops forwarding and releases the live query; it is
//! registered on the subscriber's `on_stop` so tearing down the
//! subscription stops the publication.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod frame_subscriber;
mod live_query;
mod publication;
mod publisher;
mod subscriber;

pub use config::PublisherConfig;
pub use error::{PublishError, PublishResult};
pub use frame_subscriber::FrameSubscriber;
pub use live_query::LiveQuery;
pub use publication::Publication;
pub use publisher::{publish_cursor, PublishHandle};
pub use subscriber::{RecordingSubscriber, StopCallback, StopSignal, Subscriber, SubscriberEvent};
