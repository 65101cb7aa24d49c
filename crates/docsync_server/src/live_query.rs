//! Live queries a publisher can watch.

use docsync_core::{CoreResult, Cursor, ObserveHandle, TableObserver};
use std::sync::Arc;

/// A query whose results can be observed as they change.
pub trait LiveQuery: Send + Sync {
    /// Collection the results belong to.
    fn collection_name(&self) -> &str;

    /// Starts observing. Current results are reported as `added` before
    /// this returns.
    fn observe_changes(&self, observer: Arc<dyn TableObserver>) -> CoreResult<ObserveHandle>;
}

impl LiveQuery for Cursor {
    fn collection_name(&self) -> &str {
        Cursor::collection_name(self)
    }

    fn observe_changes(&self, observer: Arc<dyn TableObserver>) -> CoreResult<ObserveHandle> {
        Ok(Cursor::observe_changes(self, observer))
    }
}
