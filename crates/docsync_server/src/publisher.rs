//! Bridging a live query to a subscriber.

use crate::config::PublisherConfig;
use crate::error::PublishResult;
use crate::live_query::LiveQuery;
use crate::subscriber::Subscriber;
use docsync_core::{DocumentId, FieldDelta, Fields, ObserveHandle, TableObserver};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Handle to a running publication of one live query.
///
/// Cloning shares the handle. Stopping is idempotent and safe from any
/// thread, including from inside a subscriber callback.
#[derive(Clone)]
pub struct PublishHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    collection: String,
    stopped: Arc<AtomicBool>,
    observe: Mutex<Option<ObserveHandle>>,
}

impl PublishHandle {
    /// Returns the published collection.
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Stops forwarding and releases the live query.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let observe = self.inner.observe.lock().take();
        if let Some(observe) = observe {
            observe.stop();
        }
        debug!(collection = %self.inner.collection, "publication stopped");
    }

    /// Returns true once stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PublishHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishHandle")
            .field("collection", &self.inner.collection)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct ForwardingObserver {
    collection: String,
    subscriber: Arc<dyn Subscriber>,
    stopped: Arc<AtomicBool>,
}

impl ForwardingObserver {
    fn live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

impl TableObserver for ForwardingObserver {
    fn added(&self, id: &DocumentId, fields: &Fields) {
        if self.live() {
            self.subscriber.added(&self.collection, id, fields);
        }
    }

    fn changed(&self, id: &DocumentId, fields: &FieldDelta) {
        if self.live() {
            self.subscriber.changed(&self.collection, id, fields);
        }
    }

    fn removed(&self, id: &DocumentId) {
        if self.live() {
            self.subscriber.removed(&self.collection, id);
        }
    }
}

/// Publishes `query` to `subscriber`.
///
/// Current results are forwarded as `added` before this returns, wrapped
/// in `begin_snapshot` / `end_snapshot` when configured. The returned
/// handle is registered on the subscriber's `on_stop`.
///
/// # Errors
///
/// Returns an error if the live query cannot be started.
pub fn publish_cursor<Q: LiveQuery + ?Sized>(
    query: &Q,
    subscriber: Arc<dyn Subscriber>,
    config: &PublisherConfig,
) -> PublishResult<PublishHandle> {
    let collection = query.collection_name().to_string();
    let stopped = Arc::new(AtomicBool::new(false));
    let observer = Arc::new(ForwardingObserver {
        collection: collection.clone(),
        subscriber: Arc::clone(&subscriber),
        stopped: Arc::clone(&stopped),
    });

    if config.batch_initial_snapshot {
        subscriber.begin_snapshot(&collection);
    }
    let observed = query.observe_changes(observer);
    if config.batch_initial_snapshot {
        subscriber.end_snapshot(&collection);
    }
    let observe = observed?;

    let handle = PublishHandle {
        inner: Arc::new(HandleInner {
            collection,
            stopped,
            observe: Mutex::new(Some(observe)),
        }),
    };
    let on_stop = handle.clone();
    subscriber.on_stop(Box::new(move || on_stop.stop()));
    debug!(collection = %handle.collection(), "publication started");
    Ok(handle)
}
