//! In-memory document table with pausable observers.

use crate::document::{diff_fields, Document, FieldDelta, Fields, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use crate::observer::{DeliveryQueue, ObserveHandle, ObserverList, TableEvent, TableObserver};
use crate::selector::Selector;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

type DocMap = BTreeMap<DocumentId, Fields>;

struct TableState {
    docs: DocMap,
    /// Nesting depth of `pause_observers` calls.
    pause_depth: usize,
    /// Contents as last reported to observers; set while paused.
    snapshot: Option<DocMap>,
}

/// A keyed, observable, in-memory document table.
///
/// The table enforces identifier uniqueness and immutability. All
/// mutations are reported to registered observers unless observers are
/// paused; see [`pause_observers`](Self::pause_observers).
///
/// # Example
///
/// ```
/// use docsync_core::{Document, DocumentId, DocumentTable, Fields, Value};
///
/// let table = DocumentTable::new("tasks");
/// let mut fields = Fields::new();
/// fields.insert("title".into(), Value::from("write docs"));
/// table.insert(Document::new(DocumentId::text("t1"), fields)).unwrap();
///
/// assert_eq!(table.len(), 1);
/// assert!(table.get(&DocumentId::text("t1")).is_some());
/// ```
pub struct DocumentTable {
    name: String,
    state: RwLock<TableState>,
    observers: Arc<ObserverList>,
    delivery: DeliveryQueue,
}

impl DocumentTable {
    /// Creates an empty table for the named collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(TableState {
                docs: DocMap::new(),
                pause_depth: 0,
                snapshot: None,
            }),
            observers: Arc::new(ObserverList::default()),
            delivery: DeliveryQueue::default(),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a document by identifier.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.state
            .read()
            .docs
            .get(id)
            .map(|fields| Document::new(id.clone(), fields.clone()))
    }

    /// Returns true if a document with this identifier is stored.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.state.read().docs.contains_key(id)
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.state.read().docs.len()
    }

    /// Returns true if the table holds no documents.
    pub fn is_empty(&self) -> bool {
        self.state.read().docs.is_empty()
    }

    /// Returns all documents in identifier order.
    pub fn documents(&self) -> Vec<Document> {
        self.state
            .read()
            .docs
            .iter()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect()
    }

    /// Returns the documents matching a selector, in identifier order.
    pub fn find(&self, selector: &Selector) -> Vec<Document> {
        let state = self.state.read();
        matching_ids(&state.docs, selector)
            .into_iter()
            .filter_map(|id| {
                state
                    .docs
                    .get(&id)
                    .map(|fields| Document::new(id.clone(), fields.clone()))
            })
            .collect()
    }

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateId`] if the identifier is taken.
    pub fn insert(&self, doc: Document) -> CoreResult<()> {
        self.mutate(|name, docs, events| insert_doc(name, docs, doc, events))
    }

    /// Sets and unsets fields of one document.
    ///
    /// Fields whose new value equals the stored value, and unset fields
    /// that are not present, produce no notification.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocumentNotFound`] if the document is absent
    /// and [`CoreError::ImmutableId`] if `_id` is targeted.
    pub fn update(&self, id: &DocumentId, set: Fields, unset: &[String]) -> CoreResult<()> {
        self.mutate(|name, docs, events| update_doc(name, docs, id, &set, unset, events))
    }

    /// Replaces all fields of an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocumentNotFound`] if the document is absent.
    pub fn replace(&self, doc: Document) -> CoreResult<()> {
        self.mutate(|name, docs, events| {
            let (id, fields) = doc.into_parts();
            let stored = docs.get_mut(&id).ok_or_else(|| not_found(name, &id))?;
            let delta = diff_fields(stored, &fields);
            *stored = fields;
            if !delta.is_empty() {
                events.push(TableEvent::Changed(id, delta));
            }
            Ok(())
        })
    }

    /// Removes a document by identifier, returning it if it was stored.
    pub fn remove(&self, id: &DocumentId) -> Option<Document> {
        // Removal by id cannot fail.
        self.mutate(|_, docs, events| Ok(remove_doc(docs, id, events)))
            .unwrap_or(None)
    }

    /// Removes every document and returns how many were removed.
    pub fn clear(&self) -> usize {
        self.mutate(|_, docs, events| {
            let removed = std::mem::take(docs);
            events.extend(removed.into_keys().map(TableEvent::Removed));
            Ok(events.len())
        })
        .unwrap_or(0)
    }

    /// Updates every document matched by a caller-supplied selector.
    ///
    /// The selector passes the safety check first: arrays are rejected and
    /// falsy selectors match nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSelector`] for rejected selectors and
    /// [`CoreError::ImmutableId`] if `_id` is targeted.
    pub fn update_matching(
        &self,
        selector: &Value,
        set: Fields,
        unset: &[String],
    ) -> CoreResult<usize> {
        let selector = Selector::from_value(selector)?;
        self.mutate(|name, docs, events| {
            let ids = matching_ids(docs, &selector);
            for id in &ids {
                update_doc(name, docs, id, &set, unset, events)?;
            }
            Ok(ids.len())
        })
    }

    /// Removes every document matched by a caller-supplied selector.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSelector`] for rejected selectors.
    pub fn remove_matching(&self, selector: &Value) -> CoreResult<usize> {
        let selector = Selector::from_value(selector)?;
        self.mutate(|_, docs, events| {
            let ids = matching_ids(docs, &selector);
            for id in &ids {
                remove_doc(docs, id, events);
            }
            Ok(ids.len())
        })
    }

    /// Pauses observer notifications.
    ///
    /// Mutations are still applied. Calls nest; notifications resume when
    /// every pause has been matched by [`resume_observers`](Self::resume_observers).
    pub fn pause_observers(&self) {
        let mut state = self.state.write();
        if state.pause_depth == 0 {
            state.snapshot = Some(state.docs.clone());
            debug!(collection = %self.name, "observers paused");
        }
        state.pause_depth += 1;
    }

    /// Resumes observer notifications.
    ///
    /// On the outermost resume, observers receive the net difference
    /// between the contents at pause time and now: removals first, then
    /// additions and changes in identifier order.
    pub fn resume_observers(&self) {
        {
            let mut state = self.state.write();
            if state.pause_depth == 0 {
                warn!(collection = %self.name, "resume_observers called while not paused");
                return;
            }
            state.pause_depth -= 1;
            if state.pause_depth > 0 {
                return;
            }
            let snapshot = state.snapshot.take().unwrap_or_default();
            let events = diff_tables(&snapshot, &state.docs);
            debug!(collection = %self.name, events = events.len(), "observers resumed");
            self.delivery.push(self.observers.snapshot(), events);
        }
        self.delivery.flush();
    }

    /// Returns true while observers are paused.
    pub fn is_paused(&self) -> bool {
        self.state.read().pause_depth > 0
    }

    /// Registers an observer.
    ///
    /// The observer first receives `added` for every document observers
    /// currently know about (the pause-time contents while paused), then
    /// every later change. Writers running concurrently never get a change
    /// in ahead of that initial snapshot. The observer is removed when the
    /// returned handle is stopped or dropped.
    pub fn observe(&self, observer: Arc<dyn TableObserver>) -> ObserveHandle {
        let id = {
            let state = self.state.read();
            let visible = state.snapshot.as_ref().unwrap_or(&state.docs);
            let initial: Vec<TableEvent> = visible
                .iter()
                .map(|(id, fields)| TableEvent::Added(id.clone(), fields.clone()))
                .collect();
            self.delivery.push(vec![Arc::clone(&observer)], initial);
            self.observers.add(observer)
        };
        self.delivery.flush();
        ObserveHandle::new(id, &self.observers)
    }

    /// Returns the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn mutate<R>(
        &self,
        f: impl FnOnce(&str, &mut DocMap, &mut Vec<TableEvent>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let result = {
            let mut state = self.state.write();
            let mut events = Vec::new();
            let result = f(&self.name, &mut state.docs, &mut events);
            if state.pause_depth == 0 {
                self.delivery.push(self.observers.snapshot(), events);
            }
            result
        };
        self.delivery.flush();
        result
    }
}

impl std::fmt::Debug for DocumentTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentTable")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("paused", &self.is_paused())
            .finish()
    }
}

fn not_found(name: &str, id: &DocumentId) -> CoreError {
    CoreError::DocumentNotFound {
        collection: name.to_string(),
        id: id.stringify(),
    }
}

fn insert_doc(
    name: &str,
    docs: &mut DocMap,
    doc: Document,
    events: &mut Vec<TableEvent>,
) -> CoreResult<()> {
    let (id, fields) = doc.into_parts();
    if docs.contains_key(&id) {
        return Err(CoreError::DuplicateId {
            collection: name.to_string(),
            id: id.stringify(),
        });
    }
    docs.insert(id.clone(), fields.clone());
    events.push(TableEvent::Added(id, fields));
    Ok(())
}

fn update_doc(
    name: &str,
    docs: &mut DocMap,
    id: &DocumentId,
    set: &Fields,
    unset: &[String],
    events: &mut Vec<TableEvent>,
) -> CoreResult<()> {
    if set.contains_key(ID_FIELD) || unset.iter().any(|f| f == ID_FIELD) {
        return Err(CoreError::ImmutableId {
            collection: name.to_string(),
            id: id.stringify(),
        });
    }
    let stored = docs.get_mut(id).ok_or_else(|| not_found(name, id))?;

    let mut delta = FieldDelta::new();
    for (field, value) in set {
        if stored.get(field) != Some(value) {
            stored.insert(field.clone(), value.clone());
            delta.insert(field.clone(), Some(value.clone()));
        }
    }
    for field in unset {
        if stored.remove(field).is_some() {
            delta.insert(field.clone(), None);
        }
    }
    if !delta.is_empty() {
        events.push(TableEvent::Changed(id.clone(), delta));
    }
    Ok(())
}

fn remove_doc(
    docs: &mut DocMap,
    id: &DocumentId,
    events: &mut Vec<TableEvent>,
) -> Option<Document> {
    let fields = docs.remove(id)?;
    events.push(TableEvent::Removed(id.clone()));
    Some(Document::new(id.clone(), fields))
}

fn matching_ids(docs: &DocMap, selector: &Selector) -> Vec<DocumentId> {
    if let Some(id) = selector.pinned_id() {
        return docs
            .get_key_value(id)
            .filter(|(id, fields)| selector.matches_fields(id, fields))
            .map(|(id, _)| vec![id.clone()])
            .unwrap_or_default();
    }
    docs.iter()
        .filter(|(id, fields)| selector.matches_fields(id, fields))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Events that turn the `before` contents into the `after` contents.
fn diff_tables(before: &DocMap, after: &DocMap) -> Vec<TableEvent> {
    let mut events: Vec<TableEvent> = before
        .keys()
        .filter(|id| !after.contains_key(*id))
        .map(|id| TableEvent::Removed(id.clone()))
        .collect();

    for (id, fields) in after {
        match before.get(id) {
            None => events.push(TableEvent::Added(id.clone(), fields.clone())),
            Some(old) => {
                let delta = diff_fields(old, fields);
                if !delta.is_empty() {
                    events.push(TableEvent::Changed(id.clone(), delta));
                }
            }
        }
    }
    events
}
