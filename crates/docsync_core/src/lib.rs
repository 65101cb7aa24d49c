//! # docsync Core
//!
//! Document model and the observable in-memory document table used by
//! docsync replicas.
//!
//! This crate provides:
//! - `Value` and `Document` for schemaless documents
//! - `DocumentId` with its source-encoded string form
//! - `Selector` and the selector safety check
//! - `DocumentTable` with pausable, diff-coalescing observers
//! - `Cursor` live queries over a table
//!
//! ## Observer model
//!
//! Every mutation of a `DocumentTable` is reported to its observers as
//! `added`, `changed` or `removed`. While observers are paused the table
//! keeps accepting writes but reports nothing; resuming diffs the
//! pause-time snapshot against the current contents and reports only the
//! net difference.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod document;
mod error;
mod id;
mod observer;
mod selector;
mod table;
mod value;

pub use cursor::Cursor;
pub use document::{diff_fields, Document, FieldDelta, Fields, ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use id::DocumentId;
pub use observer::{ObserveHandle, RecordingObserver, TableEvent, TableObserver};
pub use selector::Selector;
pub use table::DocumentTable;
pub use value::{Value, BINARY_KEY};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
