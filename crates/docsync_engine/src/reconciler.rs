//! Batch coordination and reset for one replica.

use crate::config::MergeMode;
use crate::error::{EngineError, EngineResult};
use crate::normalizer::normalize;
use crate::target::ReplicaTarget;
use docsync_protocol::ChangeMessage;
use tracing::{debug, warn};

/// An ordered group of change messages applied as one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Clear the replica before applying the messages.
    pub reset: bool,
    /// Messages in application order.
    pub messages: Vec<ChangeMessage>,
}

impl Batch {
    /// Creates an incremental batch.
    pub fn new(messages: Vec<ChangeMessage>) -> Self {
        Self {
            reset: false,
            messages,
        }
    }

    /// Creates a batch that replaces the whole replica.
    pub fn reset(messages: Vec<ChangeMessage>) -> Self {
        Self {
            reset: true,
            messages,
        }
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the batch holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns true if observers must be paused while applying.
    pub fn pauses_observers(&self) -> bool {
        pauses_observers(self.messages.len(), self.reset)
    }
}

/// Counters for one reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Completed batches.
    pub batches: u64,
    /// Applied messages.
    pub messages: u64,
    /// Resets performed.
    pub resets: u64,
    /// Documents removed by resets.
    pub documents_cleared: u64,
    /// Batches aborted by an error.
    pub aborted: u64,
}

#[derive(Debug)]
struct OpenBatch {
    declared: usize,
    applied: usize,
    paused: bool,
}

fn pauses_observers(size: usize, reset: bool) -> bool {
    size > 1 || reset
}

/// Applies authoritative change batches to one replica table.
///
/// Batches arrive either framed (`begin_update`, `update` per message,
/// `end_update`) or whole via [`apply_batch`](Self::apply_batch). Either
/// way observers are resumed on every exit path: a failed `update` aborts
/// the open batch.
///
/// # Example
///
/// ```
/// use docsync_core::{DocumentId, DocumentTable, Fields};
/// use docsync_engine::{Batch, MergeMode, Reconciler};
/// use docsync_protocol::ChangeMessage;
/// use std::sync::Arc;
///
/// let table = Arc::new(DocumentTable::new("tasks"));
/// let mut reconciler = Reconciler::new(Arc::clone(&table), MergeMode::Strict);
///
/// reconciler
///     .apply_batch(&Batch::reset(vec![
///         ChangeMessage::added("1", Fields::new()),
///         ChangeMessage::added("2", Fields::new()),
///     ]))
///     .unwrap();
/// assert_eq!(table.len(), 2);
/// ```
pub struct Reconciler<T: ReplicaTarget> {
    collection: String,
    target: T,
    mode: MergeMode,
    open: Option<OpenBatch>,
    stats: ReconcileStats,
}

impl<T: ReplicaTarget> Reconciler<T> {
    /// Creates a reconciler for `target`.
    pub fn new(target: T, mode: MergeMode) -> Self {
        Self {
            collection: target.name().to_string(),
            target,
            mode,
            open: None,
            stats: ReconcileStats::default(),
        }
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the merge mode.
    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Returns the reconciled table.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns the counters.
    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Returns true while a framed batch is open.
    pub fn in_batch(&self) -> bool {
        self.open.is_some()
    }

    /// Opens a framed batch of `batch_size` messages.
    ///
    /// Observers are paused when `batch_size > 1` or `reset` is set. A
    /// reset clears the table before any message is applied.
    ///
    /// # Errors
    ///
    /// Returns a framing error if a batch is already open.
    pub fn begin_update(&mut self, batch_size: usize, reset: bool) -> EngineResult<()> {
        if self.open.is_some() {
            self.abort();
            return Err(EngineError::framing(
                &self.collection,
                "beginUpdate while a batch is open",
            ));
        }

        let paused = pauses_observers(batch_size, reset);
        if paused {
            self.target.pause_observers();
        }
        self.open = Some(OpenBatch {
            declared: batch_size,
            applied: 0,
            paused,
        });
        debug!(collection = %self.collection, batch_size, reset, "batch opened");

        if reset {
            self.reset();
        }
        Ok(())
    }

    /// Applies one message of the open batch.
    ///
    /// # Errors
    ///
    /// Returns a framing error outside a batch or past the declared size,
    /// and any violation or table error from applying the message. All
    /// errors abort the batch and resume observers.
    pub fn update(&mut self, message: &ChangeMessage) -> EngineResult<()> {
        let (declared, applied) = match &self.open {
            Some(open) => (open.declared, open.applied),
            None => {
                return Err(EngineError::framing(
                    &self.collection,
                    "update outside a batch",
                ))
            }
        };
        if applied >= declared {
            self.abort();
            return Err(EngineError::framing(
                &self.collection,
                format!("more updates than the declared batch size of {declared}"),
            ));
        }

        if let Err(err) = apply_message(&self.target, self.mode, &self.collection, message) {
            self.abort();
            return Err(err);
        }
        if let Some(open) = self.open.as_mut() {
            open.applied += 1;
        }
        self.stats.messages += 1;
        Ok(())
    }

    /// Closes the open batch and resumes observers, which then see the
    /// whole batch as one coalesced set of notifications.
    ///
    /// # Errors
    ///
    /// Returns a framing error without an open batch, or if fewer updates
    /// arrived than declared. Observers are resumed either way.
    pub fn end_update(&mut self) -> EngineResult<()> {
        let open = self.open.take().ok_or_else(|| {
            EngineError::framing(&self.collection, "endUpdate without beginUpdate")
        })?;
        if open.paused {
            self.target.resume_observers();
        }
        if open.applied != open.declared {
            self.stats.aborted += 1;
            return Err(EngineError::framing(
                &self.collection,
                format!(
                    "batch declared {} updates but carried {}",
                    open.declared, open.applied
                ),
            ));
        }
        self.stats.batches += 1;
        debug!(collection = %self.collection, applied = open.applied, "batch closed");
        Ok(())
    }

    /// Removes every document from the table.
    ///
    /// Idempotent; returns how many documents were removed.
    pub fn reset(&mut self) -> usize {
        let removed = self.target.clear();
        self.stats.resets += 1;
        self.stats.documents_cleared += removed as u64;
        debug!(collection = %self.collection, removed, "replica reset");
        removed
    }

    /// Applies a whole batch as one step.
    ///
    /// # Errors
    ///
    /// Returns the first violation or table error. Messages before the
    /// failing one stay applied; observers are resumed regardless.
    pub fn apply_batch(&mut self, batch: &Batch) -> EngineResult<()> {
        if self.open.is_some() {
            return Err(EngineError::framing(
                &self.collection,
                "apply_batch while a framed batch is open",
            ));
        }

        let _guard = PauseGuard::new(&self.target, batch.pauses_observers());
        if batch.reset {
            let removed = self.target.clear();
            self.stats.resets += 1;
            self.stats.documents_cleared += removed as u64;
            debug!(collection = %self.collection, removed, "replica reset");
        }
        for message in &batch.messages {
            if let Err(err) = apply_message(&self.target, self.mode, &self.collection, message) {
                self.stats.aborted += 1;
                return Err(err);
            }
            self.stats.messages += 1;
        }
        self.stats.batches += 1;
        debug!(
            collection = %self.collection,
            messages = batch.len(),
            reset = batch.reset,
            "batch applied"
        );
        Ok(())
    }

    /// Discards the open framed batch, if any, and resumes observers.
    ///
    /// Messages already applied stay applied. Returns true if a batch was
    /// open.
    pub fn abort(&mut self) -> bool {
        let Some(open) = self.open.take() else {
            return false;
        };
        if open.paused {
            self.target.resume_observers();
        }
        self.stats.aborted += 1;
        warn!(
            collection = %self.collection,
            applied = open.applied,
            declared = open.declared,
            "batch aborted"
        );
        true
    }
}

impl<T: ReplicaTarget> Drop for Reconciler<T> {
    fn drop(&mut self) {
        self.abort();
    }
}

impl<T: ReplicaTarget> std::fmt::Debug for Reconciler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("collection", &self.collection)
            .field("mode", &self.mode)
            .field("open", &self.open)
            .finish()
    }
}

fn apply_message<T: ReplicaTarget>(
    target: &T,
    mode: MergeMode,
    collection: &str,
    message: &ChangeMessage,
) -> EngineResult<()> {
    let current = target.get(message.id());
    let op = normalize(mode, current.as_ref(), message).map_err(|violation| {
        EngineError::Violation {
            collection: collection.to_string(),
            violation,
        }
    })?;
    if let Some(op) = op {
        target.apply(op)?;
    }
    Ok(())
}

/// Resumes observers when dropped.
struct PauseGuard<'a, T: ReplicaTarget> {
    target: &'a T,
    paused: bool,
}

impl<'a, T: ReplicaTarget> PauseGuard<'a, T> {
    fn new(target: &'a T, pause: bool) -> Self {
        if pause {
            target.pause_observers();
        }
        Self {
            target,
            paused: pause,
        }
    }
}

impl<T: ReplicaTarget> Drop for PauseGuard<'_, T> {
    fn drop(&mut self) {
        if self.paused {
            self.target.resume_observers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolViolation;
    use docsync_core::{
        DocumentId, DocumentTable, FieldDelta, Fields, RecordingObserver, TableEvent, Value,
    };
    use std::sync::Arc;

    fn fields(pairs: &[(&str, i64)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Integer(*v)))
            .collect()
    }

    fn setup(mode: MergeMode) -> (Arc<DocumentTable>, Reconciler<Arc<DocumentTable>>) {
        let table = Arc::new(DocumentTable::new("tasks"));
        let reconciler = Reconciler::new(Arc::clone(&table), mode);
        (table, reconciler)
    }

    #[test]
    fn framed_batch_is_observed_once() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        let observer = Arc::new(RecordingObserver::new());
        let _handle = table.observe(observer.clone());

        reconciler.begin_update(2, false).unwrap();
        reconciler
            .update(&ChangeMessage::added("1", fields(&[("a", 1)])))
            .unwrap();
        reconciler
            .update(&ChangeMessage::added("2", fields(&[("a", 2)])))
            .unwrap();
        assert!(observer.is_empty());
        assert_eq!(table.len(), 2);

        reconciler.end_update().unwrap();
        assert_eq!(
            observer.take(),
            vec![
                TableEvent::Added(DocumentId::text("1"), fields(&[("a", 1)])),
                TableEvent::Added(DocumentId::text("2"), fields(&[("a", 2)])),
            ]
        );
        assert_eq!(reconciler.stats().batches, 1);
    }

    #[test]
    fn single_message_batch_is_not_paused() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        reconciler.begin_update(1, false).unwrap();
        assert!(!table.is_paused());
        reconciler.update(&ChangeMessage::removed("x")).unwrap_err();
        assert!(!reconciler.in_batch());
    }

    #[test]
    fn failed_update_aborts_and_resumes() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        reconciler.begin_update(2, false).unwrap();
        assert!(table.is_paused());

        let err = reconciler.update(&ChangeMessage::removed("x")).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(!table.is_paused());
        assert!(!reconciler.in_batch());
        assert_eq!(reconciler.stats().aborted, 1);

        let err = reconciler.end_update().unwrap_err();
        assert!(matches!(err, EngineError::Framing { .. }));
    }

    #[test]
    fn framing_errors() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        assert!(matches!(
            reconciler.update(&ChangeMessage::removed("x")),
            Err(EngineError::Framing { .. })
        ));
        assert!(matches!(
            reconciler.end_update(),
            Err(EngineError::Framing { .. })
        ));

        reconciler.begin_update(3, false).unwrap();
        assert!(matches!(
            reconciler.begin_update(1, false),
            Err(EngineError::Framing { .. })
        ));
        assert!(!table.is_paused());

        reconciler.begin_update(0, false).unwrap();
        assert!(matches!(
            reconciler.update(&ChangeMessage::added("1", Fields::new())),
            Err(EngineError::Framing { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn short_batch_still_resumes() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        reconciler.begin_update(3, false).unwrap();
        reconciler
            .update(&ChangeMessage::added("1", Fields::new()))
            .unwrap();
        assert!(reconciler.end_update().is_err());
        assert!(!table.is_paused());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reset_is_idempotent() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        assert_eq!(reconciler.reset(), 0);
        assert!(table.is_empty());

        table
            .insert(docsync_core::Document::new(DocumentId::text("1"), Fields::new()))
            .unwrap();
        assert_eq!(reconciler.reset(), 1);
        assert_eq!(reconciler.reset(), 0);
        assert!(table.is_empty());
        assert_eq!(reconciler.stats().resets, 3);
    }

    #[test]
    fn reset_batch_replaces_contents() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        reconciler
            .apply_batch(&Batch::new(vec![
                ChangeMessage::added("1", fields(&[("v", 0)])),
                ChangeMessage::added("9", Fields::new()),
            ]))
            .unwrap();

        let observer = Arc::new(RecordingObserver::new());
        let _handle = table.observe(observer.clone());
        observer.take();

        reconciler
            .apply_batch(&Batch::reset(vec![
                ChangeMessage::added("1", fields(&[("v", 1)])),
                ChangeMessage::added("2", Fields::new()),
            ]))
            .unwrap();

        let ids: Vec<_> = table.documents().iter().map(|d| d.id().clone()).collect();
        assert_eq!(ids, vec![DocumentId::text("1"), DocumentId::text("2")]);

        let mut delta = FieldDelta::new();
        delta.insert("v".into(), Some(Value::Integer(1)));
        assert_eq!(
            observer.take(),
            vec![
                TableEvent::Removed(DocumentId::text("9")),
                TableEvent::Changed(DocumentId::text("1"), delta),
                TableEvent::Added(DocumentId::text("2"), Fields::new()),
            ]
        );
    }

    #[test]
    fn apply_batch_resumes_on_error() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        let err = reconciler
            .apply_batch(&Batch::new(vec![
                ChangeMessage::added("1", Fields::new()),
                ChangeMessage::added("1", Fields::new()),
            ]))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Violation {
                violation: ProtocolViolation::AddExisting(_),
                ..
            }
        ));
        assert!(!table.is_paused());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn abort_discards_open_batch() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        assert!(!reconciler.abort());

        reconciler.begin_update(2, false).unwrap();
        reconciler
            .update(&ChangeMessage::added("1", Fields::new()))
            .unwrap();
        assert!(reconciler.abort());
        assert!(!table.is_paused());
        assert!(!reconciler.in_batch());
        assert_eq!(reconciler.stats().aborted, 1);
        assert_eq!(table.len(), 1);

        reconciler.begin_update(1, false).unwrap();
        reconciler
            .update(&ChangeMessage::added("2", Fields::new()))
            .unwrap();
        reconciler.end_update().unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn dropping_open_batch_resumes() {
        let (table, mut reconciler) = setup(MergeMode::Strict);
        reconciler.begin_update(5, true).unwrap();
        assert!(table.is_paused());
        drop(reconciler);
        assert!(!table.is_paused());
    }

    #[test]
    fn soft_mode_absorbs() {
        let (table, mut reconciler) = setup(MergeMode::Soft);
        reconciler
            .apply_batch(&Batch::new(vec![
                ChangeMessage::added("1", fields(&[("a", 1)])),
                ChangeMessage::added("1", fields(&[("a", 2)])),
                ChangeMessage::removed("missing"),
            ]))
            .unwrap();
        assert_eq!(
            table.get(&DocumentId::text("1")).unwrap().fields(),
            &fields(&[("a", 2)])
        );
        assert_eq!(table.len(), 1);
    }
}
