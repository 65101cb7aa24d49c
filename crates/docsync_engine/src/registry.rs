//! Named replica stores.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::reconciler::Reconciler;
use crate::target::ReplicaTarget;
use docsync_core::DocumentTable;
use docsync_protocol::{ChangeMessage, Frame};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A store that accepts framed change batches for one collection.
pub trait ReplicaStore: Send {
    /// Collection name.
    fn collection(&self) -> &str;

    /// Opens a batch.
    fn begin_update(&mut self, batch_size: usize, reset: bool) -> EngineResult<()>;

    /// Applies one message of the open batch.
    fn update(&mut self, message: &ChangeMessage) -> EngineResult<()>;

    /// Closes the open batch.
    fn end_update(&mut self) -> EngineResult<()>;

    /// Removes every document.
    fn reset(&mut self) -> usize;

    /// Discards the open batch, if any, and resumes observers. Returns
    /// true if a batch was open.
    fn abort(&mut self) -> bool;

    /// Routes one frame to the matching batch operation.
    fn apply_frame(&mut self, frame: &Frame) -> EngineResult<()> {
        match frame {
            Frame::BeginUpdate {
                batch_size, reset, ..
            } => self.begin_update(*batch_size as usize, *reset),
            Frame::Update { message, .. } => self.update(message),
            Frame::EndUpdate { .. } => self.end_update(),
        }
    }
}

impl<T: ReplicaTarget> ReplicaStore for Reconciler<T> {
    fn collection(&self) -> &str {
        Reconciler::collection(self)
    }

    fn begin_update(&mut self, batch_size: usize, reset: bool) -> EngineResult<()> {
        Reconciler::begin_update(self, batch_size, reset)
    }

    fn update(&mut self, message: &ChangeMessage) -> EngineResult<()> {
        Reconciler::update(self, message)
    }

    fn end_update(&mut self) -> EngineResult<()> {
        Reconciler::end_update(self)
    }

    fn reset(&mut self) -> usize {
        Reconciler::reset(self)
    }

    fn abort(&mut self) -> bool {
        Reconciler::abort(self)
    }
}

type SharedStore = Arc<Mutex<Box<dyn ReplicaStore>>>;

/// Maps collection names to their stores.
///
/// Frames for a collection with no registered store are queued (when
/// enabled) and replayed in order once a store registers under that name.
pub struct StoreRegistry {
    config: EngineConfig,
    stores: RwLock<HashMap<String, SharedStore>>,
    pending: Mutex<HashMap<String, Vec<Frame>>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stores: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a store under its collection name.
    ///
    /// Returns `Ok(false)` without replacing anything if the name is
    /// already taken. Frames queued for the name are replayed into the new
    /// store before any later frame reaches it.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while replaying queued frames. The
    /// store stays registered.
    pub fn register(&self, store: Box<dyn ReplicaStore>) -> EngineResult<bool> {
        let name = store.collection().to_string();
        let shared: SharedStore = Arc::new(Mutex::new(store));
        let mut guard = shared.lock();

        let queued = {
            let mut stores = self.stores.write();
            if stores.contains_key(&name) {
                warn!(
                    collection = %name,
                    "there is already a store registered for this collection"
                );
                return Ok(false);
            }
            stores.insert(name.clone(), Arc::clone(&shared));
            self.pending.lock().remove(&name).unwrap_or_default()
        };

        debug!(collection = %name, queued = queued.len(), "store registered");
        for frame in &queued {
            guard.apply_frame(frame)?;
        }
        Ok(true)
    }

    /// Registers a table reconciled with the configured merge mode.
    pub fn register_table(&self, table: Arc<DocumentTable>) -> EngineResult<bool> {
        self.register(Box::new(Reconciler::new(table, self.config.mode)))
    }

    /// Removes the store registered under `collection`.
    pub fn unregister(&self, collection: &str) -> bool {
        let removed = self.stores.write().remove(collection).is_some();
        self.pending.lock().remove(collection);
        if removed {
            debug!(collection, "store unregistered");
        }
        removed
    }

    /// Returns true if a store is registered under `collection`.
    pub fn contains(&self, collection: &str) -> bool {
        self.stores.read().contains_key(collection)
    }

    /// Returns the registered collection names, sorted.
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of frames queued for `collection`.
    pub fn pending_len(&self, collection: &str) -> usize {
        self.pending.lock().get(collection).map_or(0, Vec::len)
    }

    /// Delivers one frame to the store of its collection.
    ///
    /// # Errors
    ///
    /// Returns the store's error, [`EngineError::UnknownCollection`] when
    /// queuing is disabled, or [`EngineError::QueueOverflow`] when the
    /// queue for the collection is full.
    pub fn dispatch(&self, frame: Frame) -> EngineResult<()> {
        let stores = self.stores.read();
        if let Some(store) = stores.get(frame.collection()).cloned() {
            drop(stores);
            let mut store = store.lock();
            return store.apply_frame(&frame);
        }
        // Queue while the read lock is held so `register` cannot drain
        // the queue in between.
        let result = self.enqueue(frame);
        drop(stores);
        result
    }

    /// Discards any batch left open for `collection`.
    ///
    /// A registered store aborts its open batch. For an unregistered
    /// collection, queued frames after the last `endUpdate` are dropped so
    /// a later registration does not replay half a batch. Returns true if
    /// anything was discarded.
    pub fn abort_open_batch(&self, collection: &str) -> bool {
        let store = self.stores.read().get(collection).cloned();
        if let Some(store) = store {
            return store.lock().abort();
        }

        let mut pending = self.pending.lock();
        let Some(queue) = pending.get_mut(collection) else {
            return false;
        };
        let complete = queue
            .iter()
            .rposition(|frame| matches!(frame, Frame::EndUpdate { .. }))
            .map_or(0, |last| last + 1);
        if complete == queue.len() {
            return false;
        }
        debug!(
            collection,
            dropped = queue.len() - complete,
            "dropping queued frames of an unfinished batch"
        );
        queue.truncate(complete);
        if queue.is_empty() {
            pending.remove(collection);
        }
        true
    }

    /// Discards every open batch, registered or queued. Returns how many
    /// collections had one.
    pub fn abort_open_batches(&self) -> usize {
        let mut names = self.collections();
        names.extend(self.pending.lock().keys().cloned());
        names.sort();
        names.dedup();
        names
            .iter()
            .filter(|name| self.abort_open_batch(name))
            .count()
    }

    fn enqueue(&self, frame: Frame) -> EngineResult<()> {
        let collection = frame.collection().to_string();
        if !self.config.queue_unknown_collections {
            return Err(EngineError::UnknownCollection { collection });
        }

        let mut pending = self.pending.lock();
        let queue = pending.entry(collection.clone()).or_default();
        if queue.len() >= self.config.max_pending_per_collection {
            return Err(EngineError::QueueOverflow {
                collection,
                limit: self.config.max_pending_per_collection,
            });
        }
        if queue.is_empty() {
            warn!(%collection, "queuing updates for a collection with no store");
        }
        queue.push(frame);
        Ok(())
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("collections", &self.collections())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeMode;
    use docsync_core::{DocumentId, Fields};

    fn table(name: &str) -> Arc<DocumentTable> {
        Arc::new(DocumentTable::new(name))
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let registry = StoreRegistry::default();
        let first = table("tasks");
        assert!(registry.register_table(Arc::clone(&first)).unwrap());
        assert!(!registry.register_table(table("tasks")).unwrap());

        registry
            .dispatch(Frame::begin("tasks", 1, false))
            .unwrap();
        registry
            .dispatch(Frame::update("tasks", ChangeMessage::added("1", Fields::new())))
            .unwrap();
        registry.dispatch(Frame::end("tasks")).unwrap();
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn unknown_collection_frames_replay_on_register() {
        let registry = StoreRegistry::default();
        let frames = Frame::batch(
            "late",
            false,
            vec![
                ChangeMessage::added("1", Fields::new()),
                ChangeMessage::added("2", Fields::new()),
            ],
        )
        .unwrap();
        for frame in frames {
            registry.dispatch(frame).unwrap();
        }
        assert_eq!(registry.pending_len("late"), 4);

        let late = table("late");
        assert!(registry.register_table(Arc::clone(&late)).unwrap());
        assert_eq!(registry.pending_len("late"), 0);
        assert_eq!(late.len(), 2);
        assert!(late.contains(&DocumentId::text("2")));
    }

    #[test]
    fn queue_limits() {
        let registry =
            StoreRegistry::new(EngineConfig::default().with_max_pending_per_collection(1));
        registry.dispatch(Frame::end("x")).unwrap();
        assert!(matches!(
            registry.dispatch(Frame::end("x")),
            Err(EngineError::QueueOverflow { limit: 1, .. })
        ));

        let registry =
            StoreRegistry::new(EngineConfig::default().with_queue_unknown_collections(false));
        assert!(matches!(
            registry.dispatch(Frame::end("x")),
            Err(EngineError::UnknownCollection { .. })
        ));
    }

    #[test]
    fn unregister_and_listing() {
        let registry = StoreRegistry::new(EngineConfig::new(MergeMode::Soft));
        registry.register_table(table("b")).unwrap();
        registry.register_table(table("a")).unwrap();
        assert_eq!(registry.collections(), vec!["a".to_string(), "b".to_string()]);

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));
    }

    #[test]
    fn soft_registry_absorbs_duplicate_adds() {
        let registry = StoreRegistry::new(EngineConfig::new(MergeMode::Soft));
        let tasks = table("tasks");
        registry.register_table(Arc::clone(&tasks)).unwrap();
        for _ in 0..2 {
            let added = vec![ChangeMessage::added("1", Fields::new())];
            for frame in Frame::batch("tasks", false, added).unwrap() {
                registry.dispatch(frame).unwrap();
            }
        }
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn abort_open_batches_resumes_and_trims_queue() {
        let registry = StoreRegistry::default();
        let tasks = table("tasks");
        registry.register_table(Arc::clone(&tasks)).unwrap();
        registry.dispatch(Frame::begin("tasks", 3, false)).unwrap();
        registry
            .dispatch(Frame::update("tasks", ChangeMessage::added("1", Fields::new())))
            .unwrap();
        assert!(tasks.is_paused());

        let added = vec![ChangeMessage::added("a", Fields::new())];
        for frame in Frame::batch("late", false, added).unwrap() {
            registry.dispatch(frame).unwrap();
        }
        registry.dispatch(Frame::begin("late", 2, false)).unwrap();
        assert_eq!(registry.pending_len("late"), 4);

        assert_eq!(registry.abort_open_batches(), 2);
        assert!(!tasks.is_paused());
        assert_eq!(tasks.len(), 1);
        assert_eq!(registry.pending_len("late"), 3);
        assert_eq!(registry.abort_open_batches(), 0);

        // A fresh batch is accepted after the abort.
        let added = vec![ChangeMessage::added("2", Fields::new())];
        for frame in Frame::batch("tasks", false, added).unwrap() {
            registry.dispatch(frame).unwrap();
        }
        assert_eq!(tasks.len(), 2);

        let late = table("late");
        registry.register_table(Arc::clone(&late)).unwrap();
        assert_eq!(late.len(), 1);
    }
}
