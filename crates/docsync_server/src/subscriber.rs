//! The downstream side of a publication.

use docsync_core::{DocumentId, FieldDelta, Fields};
use parking_lot::Mutex;

/// Callback run once when a subscription stops.
pub type StopCallback = Box<dyn FnOnce() + Send>;

/// Receives published notifications.
///
/// Field maps are borrowed from the publisher and must not be modified.
pub trait Subscriber: Send + Sync {
    /// A document entered the published set.
    fn added(&self, collection: &str, id: &DocumentId, fields: &Fields);

    /// Fields of a published document changed. `None` entries were removed.
    fn changed(&self, collection: &str, id: &DocumentId, fields: &FieldDelta);

    /// A document left the published set.
    fn removed(&self, collection: &str, id: &DocumentId);

    /// Registers a callback to run when the subscription stops. A callback
    /// registered after the stop runs immediately.
    fn on_stop(&self, callback: StopCallback);

    /// The initial snapshot of `collection` starts.
    fn begin_snapshot(&self, _collection: &str) {}

    /// The initial snapshot of `collection` is complete.
    fn end_snapshot(&self, _collection: &str) {}

    /// Every cursor of the publication has delivered its snapshot.
    fn ready(&self) {}
}

/// Stop state shared by subscriber implementations.
///
/// Callbacks run at most once, outside the internal lock.
#[derive(Default)]
pub struct StopSignal {
    state: Mutex<StopState>,
}

#[derive(Default)]
struct StopState {
    stopped: bool,
    callbacks: Vec<StopCallback>,
}

impl StopSignal {
    /// Creates a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback, running it now if the signal already fired.
    pub fn register(&self, callback: StopCallback) {
        {
            let mut state = self.state.lock();
            if !state.stopped {
                state.callbacks.push(callback);
                return;
            }
        }
        callback();
    }

    /// Fires the signal. Returns false if it had already fired.
    pub fn stop(&self) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            if state.stopped {
                return false;
            }
            state.stopped = true;
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Returns true once the signal fired.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StopSignal")
            .field("stopped", &state.stopped)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// A notification received by a [`RecordingSubscriber`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberEvent {
    /// `added` notification.
    Added {
        /// Collection name.
        collection: String,
        /// Document identifier.
        id: DocumentId,
        /// Document fields.
        fields: Fields,
    },
    /// `changed` notification.
    Changed {
        /// Collection name.
        collection: String,
        /// Document identifier.
        id: DocumentId,
        /// Changed fields.
        fields: FieldDelta,
    },
    /// `removed` notification.
    Removed {
        /// Collection name.
        collection: String,
        /// Document identifier.
        id: DocumentId,
    },
    /// Snapshot started.
    BeginSnapshot(String),
    /// Snapshot finished.
    EndSnapshot(String),
    /// Publication ready.
    Ready,
}

/// A subscriber that records every notification.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<SubscriberEvent>>,
    signal: StopSignal,
}

impl RecordingSubscriber {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the recorded events.
    pub fn take(&self) -> Vec<SubscriberEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Stops the subscription, running registered stop callbacks.
    pub fn stop(&self) {
        self.signal.stop();
    }

    /// Returns true once stopped.
    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }

    fn push(&self, event: SubscriberEvent) {
        self.events.lock().push(event);
    }
}

impl Subscriber for RecordingSubscriber {
    fn added(&self, collection: &str, id: &DocumentId, fields: &Fields) {
        self.push(SubscriberEvent::Added {
            collection: collection.to_string(),
            id: id.clone(),
            fields: fields.clone(),
        });
    }

    fn changed(&self, collection: &str, id: &DocumentId, fields: &FieldDelta) {
        self.push(SubscriberEvent::Changed {
            collection: collection.to_string(),
            id: id.clone(),
            fields: fields.clone(),
        });
    }

    fn removed(&self, collection: &str, id: &DocumentId) {
        self.push(SubscriberEvent::Removed {
            collection: collection.to_string(),
            id: id.clone(),
        });
    }

    fn on_stop(&self, callback: StopCallback) {
        self.signal.register(callback);
    }

    fn begin_snapshot(&self, collection: &str) {
        self.push(SubscriberEvent::BeginSnapshot(collection.to_string()));
    }

    fn end_snapshot(&self, collection: &str) {
        self.push(SubscriberEvent::EndSnapshot(collection.to_string()));
    }

    fn ready(&self) {
        self.push(SubscriberEvent::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, StopCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn callbacks_run_once() {
        let signal = StopSignal::new();
        let (count, callback) = counter();
        signal.register(callback);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert!(signal.stop());
        assert!(!signal.stop());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(signal.is_stopped());
    }

    #[test]
    fn late_callback_runs_immediately() {
        let signal = StopSignal::new();
        signal.stop();
        let (count, callback) = counter();
        signal.register(callback);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recording_subscriber() {
        let subscriber = RecordingSubscriber::new();
        subscriber.added("c", &DocumentId::text("1"), &Fields::new());
        subscriber.removed("c", &DocumentId::text("1"));
        subscriber.ready();
        assert_eq!(subscriber.take().len(), 3);
        assert!(subscriber.take().is_empty());

        let (count, callback) = counter();
        subscriber.on_stop(callback);
        subscriber.stop();
        assert!(subscriber.is_stopped());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
