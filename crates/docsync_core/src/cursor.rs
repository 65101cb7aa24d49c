//! Live queries over a document table.

use crate::document::{Document, FieldDelta, Fields};
use crate::id::DocumentId;
use crate::observer::{ObserveHandle, TableObserver};
use crate::selector::Selector;
use crate::table::DocumentTable;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A table plus a selector.
///
/// `fetch` reads the current matches; `observe_changes` turns the cursor
/// into a live query that reports documents entering the match set as
/// `added`, leaving it as `removed`, and field changes of matching
/// documents as `changed`.
#[derive(Clone)]
pub struct Cursor {
    table: Arc<DocumentTable>,
    selector: Selector,
}

impl Cursor {
    /// Creates a cursor.
    pub fn new(table: Arc<DocumentTable>, selector: Selector) -> Self {
        Self { table, selector }
    }

    /// Creates a cursor over every document of the table.
    pub fn all(table: Arc<DocumentTable>) -> Self {
        Self::new(table, Selector::all())
    }

    /// Returns the collection name.
    pub fn collection_name(&self) -> &str {
        self.table.name()
    }

    /// Returns the selector.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Returns the documents currently matching.
    pub fn fetch(&self) -> Vec<Document> {
        self.table.find(&self.selector)
    }

    /// Returns the number of documents currently matching.
    pub fn count(&self) -> usize {
        self.fetch().len()
    }

    /// Starts a live query. Matching documents are reported as `added`
    /// before this returns.
    pub fn observe_changes(&self, observer: Arc<dyn TableObserver>) -> ObserveHandle {
        let filter = Arc::new(MatchFilter {
            selector: self.selector.clone(),
            inner: observer,
            state: Mutex::new(FilterState::default()),
        });
        self.table.observe(filter)
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.table.name())
            .field("selector", &self.selector)
            .finish()
    }
}

#[derive(Default)]
struct FilterState {
    /// Mirror of every document in the table, needed to re-evaluate the
    /// selector after partial changes.
    mirror: BTreeMap<DocumentId, Fields>,
    matched: BTreeSet<DocumentId>,
}

/// Table observer that forwards only documents matching a selector.
struct MatchFilter {
    selector: Selector,
    inner: Arc<dyn TableObserver>,
    state: Mutex<FilterState>,
}

enum Forward {
    Added(Fields),
    Changed(FieldDelta),
    Removed,
    Nothing,
}

impl TableObserver for MatchFilter {
    fn added(&self, id: &DocumentId, fields: &Fields) {
        let forward = {
            let mut state = self.state.lock();
            state.mirror.insert(id.clone(), fields.clone());
            if self.selector.matches_fields(id, fields) {
                state.matched.insert(id.clone());
                true
            } else {
                false
            }
        };
        if forward {
            self.inner.added(id, fields);
        }
    }

    fn changed(&self, id: &DocumentId, delta: &FieldDelta) {
        let forward = {
            let mut state = self.state.lock();
            let Some(fields) = state.mirror.get_mut(id) else {
                return;
            };
            for (name, value) in delta {
                match value {
                    Some(value) => fields.insert(name.clone(), value.clone()),
                    None => fields.remove(name),
                };
            }
            let now = self.selector.matches_fields(id, fields);
            let snapshot = fields.clone();
            let before = state.matched.contains(id);
            match (before, now) {
                (true, true) => Forward::Changed(delta.clone()),
                (false, true) => {
                    state.matched.insert(id.clone());
                    Forward::Added(snapshot)
                }
                (true, false) => {
                    state.matched.remove(id);
                    Forward::Removed
                }
                (false, false) => Forward::Nothing,
            }
        };
        match forward {
            Forward::Added(fields) => self.inner.added(id, &fields),
            Forward::Changed(delta) => self.inner.changed(id, &delta),
            Forward::Removed => self.inner.removed(id),
            Forward::Nothing => {}
        }
    }

    fn removed(&self, id: &DocumentId) {
        let forward = {
            let mut state = self.state.lock();
            state.mirror.remove(id);
            state.matched.remove(id)
        };
        if forward {
            self.inner.removed(id);
        }
    }
}
