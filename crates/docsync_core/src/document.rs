//! Documents and field deltas.

use crate::id::DocumentId;
use crate::value::Value;
use std::collections::BTreeMap;

/// Name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Named fields of a document, excluding the identifier.
pub type Fields = BTreeMap<String, Value>;

/// A partial field set. `None` marks a field as absent, meaning the
/// field is to be removed.
pub type FieldDelta = BTreeMap<String, Option<Value>>;

/// A stored document: an identifier plus its fields.
///
/// The identifier is kept apart from the fields; an `_id` entry in the
/// field map handed to [`Document::new`] is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    fields: Fields,
}

impl Document {
    /// Creates a document.
    pub fn new(id: DocumentId, mut fields: Fields) -> Self {
        fields.remove(ID_FIELD);
        Self { id, fields }
    }

    /// Returns the identifier.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Returns a single field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Splits into identifier and fields.
    pub fn into_parts(self) -> (DocumentId, Fields) {
        (self.id, self.fields)
    }

    /// Renders the document as a map value including `_id`.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert(ID_FIELD.to_string(), Value::Text(self.id.stringify()));
        Value::Map(map)
    }
}

/// Computes the delta that turns `before` into `after`.
///
/// Fields whose value is unchanged are left out, fields only present in
/// `before` map to `None`.
pub fn diff_fields(before: &Fields, after: &Fields) -> FieldDelta {
    let mut delta = FieldDelta::new();
    for (name, value) in after {
        if before.get(name) != Some(value) {
            delta.insert(name.clone(), Some(value.clone()));
        }
    }
    for name in before.keys() {
        if !after.contains_key(name) {
            delta.insert(name.clone(), None);
        }
    }
    delta
}
