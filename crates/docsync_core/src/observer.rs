//! Table observers.

use crate::document::{FieldDelta, Fields};
use crate::id::DocumentId;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Receives change notifications from a document table.
///
/// Notifications arrive one at a time and in commit order, even when
/// several threads write to the table. Callbacks run without the table
/// lock held, so an observer may read the table; a mutation made from a
/// callback is delivered once the current notification returns. Field
/// maps are borrowed: observers must not expect to own or modify the
/// forwarded documents.
pub trait TableObserver: Send + Sync {
    /// A document entered the observed set.
    fn added(&self, id: &DocumentId, fields: &Fields);

    /// Fields of a document changed. `None` entries were removed.
    fn changed(&self, id: &DocumentId, fields: &FieldDelta);

    /// A document left the observed set.
    fn removed(&self, id: &DocumentId);
}

/// A single notification produced by a table mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    /// Document inserted.
    Added(DocumentId, Fields),
    /// Document fields changed.
    Changed(DocumentId, FieldDelta),
    /// Document removed.
    Removed(DocumentId),
}

impl TableEvent {
    /// Delivers this event to an observer.
    pub fn deliver(&self, observer: &dyn TableObserver) {
        match self {
            TableEvent::Added(id, fields) => observer.added(id, fields),
            TableEvent::Changed(id, delta) => observer.changed(id, delta),
            TableEvent::Removed(id) => observer.removed(id),
        }
    }

    /// Returns the identifier of the affected document.
    pub fn id(&self) -> &DocumentId {
        match self {
            TableEvent::Added(id, _) | TableEvent::Changed(id, _) | TableEvent::Removed(id) => id,
        }
    }
}

/// An observer that records every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: parking_lot::Mutex<Vec<TableEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the recorded events.
    pub fn take(&self) -> Vec<TableEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl TableObserver for RecordingObserver {
    fn added(&self, id: &DocumentId, fields: &Fields) {
        self.events
            .lock()
            .push(TableEvent::Added(id.clone(), fields.clone()));
    }

    fn changed(&self, id: &DocumentId, fields: &FieldDelta) {
        self.events
            .lock()
            .push(TableEvent::Changed(id.clone(), fields.clone()));
    }

    fn removed(&self, id: &DocumentId) {
        self.events.lock().push(TableEvent::Removed(id.clone()));
    }
}

/// Registered observers of one table.
#[derive(Default)]
pub(crate) struct ObserverList {
    entries: RwLock<Vec<(u64, Arc<dyn TableObserver>)>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl ObserverList {
    pub(crate) fn add(&self, observer: Arc<dyn TableObserver>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.write().push((id, observer));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.write().retain(|(entry, _)| *entry != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns the observers registered right now.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn TableObserver>> {
        self.entries
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

struct Delivery {
    observers: Vec<Arc<dyn TableObserver>>,
    events: Vec<TableEvent>,
}

/// Committed notifications waiting to be delivered.
///
/// Tables push under their state lock, which fixes the order, and flush
/// after releasing it. Only one thread delivers at a time.
#[derive(Default)]
pub(crate) struct DeliveryQueue {
    pending: Mutex<VecDeque<Delivery>>,
    /// Held while delivering; the flag marks a flush already running on
    /// this thread.
    dispatch: ReentrantMutex<Cell<bool>>,
}

impl DeliveryQueue {
    /// Queues `events` for `observers`.
    pub(crate) fn push(&self, observers: Vec<Arc<dyn TableObserver>>, events: Vec<TableEvent>) {
        if events.is_empty() || observers.is_empty() {
            return;
        }
        self.pending.lock().push_back(Delivery { observers, events });
    }

    /// Delivers everything queued so far, in order.
    ///
    /// A nested call from inside a callback returns at once and leaves the
    /// work to the outer call.
    pub(crate) fn flush(&self) {
        let draining = self.dispatch.lock();
        if draining.replace(true) {
            return;
        }
        let _reset = ResetOnDrop(&draining);
        loop {
            let next = self.pending.lock().pop_front();
            let Some(delivery) = next else {
                return;
            };
            for event in &delivery.events {
                for observer in &delivery.observers {
                    event.deliver(observer.as_ref());
                }
            }
        }
    }
}

struct ResetOnDrop<'a>(&'a Cell<bool>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Handle to a registered observer.
///
/// Stopping is idempotent. Dropping the handle stops the observer.
pub struct ObserveHandle {
    id: u64,
    list: Weak<ObserverList>,
    stopped: AtomicBool,
}

impl ObserveHandle {
    pub(crate) fn new(id: u64, list: &Arc<ObserverList>) -> Self {
        Self {
            id,
            list: Arc::downgrade(list),
            stopped: AtomicBool::new(false),
        }
    }

    /// Stops delivering notifications to the observer.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }

    /// Returns true once [`stop`](Self::stop) has run.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for ObserveHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
