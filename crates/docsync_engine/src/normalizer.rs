//! Translation of change messages into table operations.

use crate::config::MergeMode;
use crate::error::ProtocolViolation;
use docsync_core::{Document, DocumentId, FieldDelta, Fields, ID_FIELD};
use docsync_protocol::ChangeMessage;
use tracing::debug;

/// A primitive operation on a replica table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOp {
    /// Insert a document that does not exist.
    Insert(Document),
    /// Set and unset fields of an existing document.
    Update {
        /// Target document.
        id: DocumentId,
        /// Fields to set.
        set: Fields,
        /// Fields to remove.
        unset: Vec<String>,
    },
    /// Replace every field of an existing document.
    Replace(Document),
    /// Remove an existing document.
    Remove(DocumentId),
}

impl TableOp {
    /// Returns the target document identifier.
    pub fn id(&self) -> &DocumentId {
        match self {
            TableOp::Insert(doc) | TableOp::Replace(doc) => doc.id(),
            TableOp::Update { id, .. } | TableOp::Remove(id) => id,
        }
    }
}

/// Decides which table operation applies `message` to a replica whose
/// current version of the target document is `current`.
///
/// Returns `Ok(None)` when the message leaves the replica unchanged.
///
/// # Errors
///
/// In [`MergeMode::Strict`], `added` over an existing document and
/// `changed` / `removed` of a missing document are violations. Soft mode
/// absorbs them: the add becomes a change, the removal is dropped, and
/// the change becomes an add of its non-absent fields.
pub fn normalize(
    mode: MergeMode,
    current: Option<&Document>,
    message: &ChangeMessage,
) -> Result<Option<TableOp>, ProtocolViolation> {
    match (message, current) {
        (ChangeMessage::Added { id, fields }, None) => {
            Ok(Some(TableOp::Insert(Document::new(id.clone(), fields.clone()))))
        }
        (ChangeMessage::Added { id, fields }, Some(doc)) => {
            if !mode.is_soft() {
                return Err(ProtocolViolation::AddExisting(id.clone()));
            }
            debug!(%id, "absorbing add of an existing document as a change");
            let delta: FieldDelta = fields
                .iter()
                .map(|(name, value)| (name.clone(), Some(value.clone())))
                .collect();
            Ok(field_update(doc, &delta))
        }
        (ChangeMessage::Changed { id, fields }, None) => {
            if !mode.is_soft() {
                return Err(ProtocolViolation::ChangeMissing(id.clone()));
            }
            debug!(%id, "absorbing change of a missing document as an add");
            let present: Fields = fields
                .iter()
                .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.clone())))
                .collect();
            Ok(Some(TableOp::Insert(Document::new(id.clone(), present))))
        }
        (ChangeMessage::Changed { fields, .. }, Some(doc)) => Ok(field_update(doc, fields)),
        (ChangeMessage::Removed { id }, None) => {
            if !mode.is_soft() {
                return Err(ProtocolViolation::RemoveMissing(id.clone()));
            }
            debug!(%id, "ignoring removal of a missing document");
            Ok(None)
        }
        (ChangeMessage::Removed { id }, Some(_)) => Ok(Some(TableOp::Remove(id.clone()))),
        (ChangeMessage::Replace { id, replace }, current) => Ok(match (replace, current) {
            (None, None) => None,
            (None, Some(_)) => Some(TableOp::Remove(id.clone())),
            (Some(fields), None) => {
                Some(TableOp::Insert(Document::new(id.clone(), fields.clone())))
            }
            (Some(fields), Some(_)) => {
                Some(TableOp::Replace(Document::new(id.clone(), fields.clone())))
            }
        }),
    }
}

/// Builds the minimal update turning `doc` into `doc` + `delta`.
fn field_update(doc: &Document, delta: &FieldDelta) -> Option<TableOp> {
    let mut set = Fields::new();
    let mut unset = Vec::new();
    for (name, value) in delta {
        if name == ID_FIELD {
            continue;
        }
        match value {
            Some(value) if doc.get(name) != Some(value) => {
                set.insert(name.clone(), value.clone());
            }
            Some(_) => {}
            None if doc.get(name).is_some() => unset.push(name.clone()),
            None => {}
        }
    }
    if set.is_empty() && unset.is_empty() {
        return None;
    }
    Some(TableOp::Update {
        id: doc.id().clone(),
        set,
        unset,
    })
}
