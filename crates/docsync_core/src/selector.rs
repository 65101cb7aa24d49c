//! Selectors and the selector safety check.
//!
//! Every selector that reaches a destructive table operation goes through
//! [`Selector::from_value`]. The check rejects array selectors outright
//! and rewrites falsy selectors into one that matches a freshly generated
//! identifier, so an accidentally missing filter never selects the whole
//! table.

use crate::document::{Document, Fields, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use crate::value::Value;
use tracing::debug;

/// A document selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Matches the document with this identifier.
    Id(DocumentId),
    /// Matches documents whose fields equal every listed value.
    ///
    /// An empty field set with no identifier matches every document.
    Match {
        /// Required identifier, if any.
        id: Option<DocumentId>,
        /// Required field values.
        fields: Fields,
    },
}

impl Selector {
    /// Selector matching every document.
    pub fn all() -> Self {
        Selector::Match {
            id: None,
            fields: Fields::new(),
        }
    }

    /// Selector matching documents with the given field values.
    pub fn fields(fields: Fields) -> Self {
        Selector::Match { id: None, fields }
    }

    /// Selector that can match no stored document.
    pub fn nothing() -> Self {
        Selector::Id(DocumentId::random())
    }

    /// Builds a selector from a caller-supplied value.
    ///
    /// - arrays are rejected;
    /// - null, false, zero and the empty string match nothing;
    /// - text is shorthand for `{_id: text}`;
    /// - a map whose `_id` is falsy matches nothing;
    /// - any other map is an equality matcher over its entries.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSelector`] for arrays and for shapes
    /// that are neither an identifier nor an equality map.
    pub fn from_value(selector: &Value) -> CoreResult<Self> {
        if let Value::Array(_) = selector {
            return Err(CoreError::invalid_selector(
                "array selectors are not allowed",
            ));
        }
        if selector.is_falsy() {
            debug!(kind = selector.type_name(), "falsy selector rewritten to match nothing");
            return Ok(Self::nothing());
        }

        match selector {
            Value::Text(s) => Ok(Selector::Id(DocumentId::Text(s.clone()))),
            Value::Map(map) => {
                let mut fields = map.clone();
                let id = match fields.remove(ID_FIELD) {
                    None => None,
                    Some(value) if value.is_falsy() => {
                        debug!("selector with falsy _id rewritten to match nothing");
                        return Ok(Self::nothing());
                    }
                    Some(value) => Some(id_from_value(&value)?),
                };
                match (id, fields.is_empty()) {
                    (Some(id), true) => Ok(Selector::Id(id)),
                    (id, _) => Ok(Selector::Match { id, fields }),
                }
            }
            other => Err(CoreError::invalid_selector(format!(
                "unsupported selector of type {}",
                other.type_name()
            ))),
        }
    }

    /// Returns true if the selector matches the document.
    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_fields(doc.id(), doc.fields())
    }

    /// Returns true if the selector matches a document given by parts.
    pub fn matches_fields(&self, id: &DocumentId, fields: &Fields) -> bool {
        match self {
            Selector::Id(wanted) => wanted == id,
            Selector::Match {
                id: wanted,
                fields: required,
            } => {
                wanted.as_ref().map_or(true, |w| w == id)
                    && required
                        .iter()
                        .all(|(name, value)| fields.get(name) == Some(value))
            }
        }
    }

    /// Returns the single identifier this selector is pinned to, if any.
    pub fn pinned_id(&self) -> Option<&DocumentId> {
        match self {
            Selector::Id(id) => Some(id),
            Selector::Match { id, .. } => id.as_ref(),
        }
    }
}

impl From<DocumentId> for Selector {
    fn from(id: DocumentId) -> Self {
        Selector::Id(id)
    }
}

fn id_from_value(value: &Value) -> CoreResult<DocumentId> {
    match value {
        Value::Text(s) => Ok(DocumentId::Text(s.clone())),
        Value::Bytes(b) => <[u8; 12]>::try_from(b.as_slice())
            .map(DocumentId::ObjectId)
            .map_err(|_| CoreError::invalid_selector("object id selectors must be 12 bytes")),
        other => Err(CoreError::invalid_selector(format!(
            "unsupported _id selector of type {}",
            other.type_name()
        ))),
    }
}
