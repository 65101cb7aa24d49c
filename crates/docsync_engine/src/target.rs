//! The table capability the engine writes through.

use crate::normalizer::TableOp;
use docsync_core::{CoreResult, Document, DocumentId, DocumentTable, Fields};
use std::sync::Arc;

/// Mutations and observer control of a replica table.
///
/// Implemented for [`DocumentTable`]; any table honoring the same
/// uniqueness and pause semantics can be reconciled.
pub trait ReplicaTarget: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Looks up a document.
    fn get(&self, id: &DocumentId) -> Option<Document>;

    /// Inserts a new document.
    fn insert(&self, doc: Document) -> CoreResult<()>;

    /// Sets and unsets fields of an existing document.
    fn update(&self, id: &DocumentId, set: Fields, unset: &[String]) -> CoreResult<()>;

    /// Replaces all fields of an existing document.
    fn replace(&self, doc: Document) -> CoreResult<()>;

    /// Removes a document.
    fn remove(&self, id: &DocumentId) -> Option<Document>;

    /// Removes every document, returning how many were removed.
    fn clear(&self) -> usize;

    /// Pauses observer notifications.
    fn pause_observers(&self);

    /// Resumes observer notifications.
    fn resume_observers(&self);

    /// Applies one normalized operation.
    fn apply(&self, op: TableOp) -> CoreResult<()> {
        match op {
            TableOp::Insert(doc) => self.insert(doc),
            TableOp::Update { id, set, unset } => self.update(&id, set, &unset),
            TableOp::Replace(doc) => self.replace(doc),
            TableOp::Remove(id) => {
                self.remove(&id);
                Ok(())
            }
        }
    }
}

impl ReplicaTarget for DocumentTable {
    fn name(&self) -> &str {
        DocumentTable::name(self)
    }

    fn get(&self, id: &DocumentId) -> Option<Document> {
        DocumentTable::get(self, id)
    }

    fn insert(&self, doc: Document) -> CoreResult<()> {
        DocumentTable::insert(self, doc)
    }

    fn update(&self, id: &DocumentId, set: Fields, unset: &[String]) -> CoreResult<()> {
        DocumentTable::update(self, id, set, unset)
    }

    fn replace(&self, doc: Document) -> CoreResult<()> {
        DocumentTable::replace(self, doc)
    }

    fn remove(&self, id: &DocumentId) -> Option<Document> {
        DocumentTable::remove(self, id)
    }

    fn clear(&self) -> usize {
        DocumentTable::clear(self)
    }

    fn pause_observers(&self) {
        DocumentTable::pause_observers(self)
    }

    fn resume_observers(&self) {
        DocumentTable::resume_observers(self)
    }
}

impl<T: ReplicaTarget + ?Sized> ReplicaTarget for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, id: &DocumentId) -> Option<Document> {
        (**self).get(id)
    }

    fn insert(&self, doc: Document) -> CoreResult<()> {
        (**self).insert(doc)
    }

    fn update(&self, id: &DocumentId, set: Fields, unset: &[String]) -> CoreResult<()> {
        (**self).update(id, set, unset)
    }

    fn replace(&self, doc: Document) -> CoreResult<()> {
        (**self).replace(doc)
    }

    fn remove(&self, id: &DocumentId) -> Option<Document> {
        (**self).remove(id)
    }

    fn clear(&self) -> usize {
        (**self).clear()
    }

    fn pause_observers(&self) {
        (**self).pause_observers()
    }

    fn resume_observers(&self) {
        (**self).resume_observers()
    }
}
