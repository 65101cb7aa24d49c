//! Inbound change messages.

use docsync_core::{DocumentId, FieldDelta, Fields};

/// Kind of a change message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Document added.
    Added,
    /// Document fields changed.
    Changed,
    /// Document removed.
    Removed,
    /// Final state of a document after its pending local writes settled.
    Replace,
}

impl MessageKind {
    /// Returns the wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Added => "added",
            MessageKind::Changed => "changed",
            MessageKind::Removed => "removed",
            MessageKind::Replace => "replace",
        }
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "added" => Some(MessageKind::Added),
            "changed" => Some(MessageKind::Changed),
            "removed" => Some(MessageKind::Removed),
            "replace" => Some(MessageKind::Replace),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single authoritative change to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeMessage {
    /// A document the replica does not have yet, with all its fields.
    Added {
        /// Document identifier.
        id: DocumentId,
        /// Full field set.
        fields: Fields,
    },
    /// A partial update. A `None` value means the field was removed.
    Changed {
        /// Document identifier.
        id: DocumentId,
        /// Changed fields.
        fields: FieldDelta,
    },
    /// The document is gone.
    Removed {
        /// Document identifier.
        id: DocumentId,
    },
    /// The settled state of a document. `None` means the document no
    /// longer exists.
    Replace {
        /// Document identifier.
        id: DocumentId,
        /// Replacement document fields.
        replace: Option<Fields>,
    },
}

impl ChangeMessage {
    /// Creates an `added` message.
    pub fn added(id: impl Into<DocumentId>, fields: Fields) -> Self {
        ChangeMessage::Added {
            id: id.into(),
            fields,
        }
    }

    /// Creates a `changed` message.
    pub fn changed(id: impl Into<DocumentId>, fields: FieldDelta) -> Self {
        ChangeMessage::Changed {
            id: id.into(),
            fields,
        }
    }

    /// Creates a `removed` message.
    pub fn removed(id: impl Into<DocumentId>) -> Self {
        ChangeMessage::Removed { id: id.into() }
    }

    /// Creates a `replace` message.
    pub fn replace(id: impl Into<DocumentId>, replace: Option<Fields>) -> Self {
        ChangeMessage::Replace {
            id: id.into(),
            replace,
        }
    }

    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        match self {
            ChangeMessage::Added { .. } => MessageKind::Added,
            ChangeMessage::Changed { .. } => MessageKind::Changed,
            ChangeMessage::Removed { .. } => MessageKind::Removed,
            ChangeMessage::Replace { .. } => MessageKind::Replace,
        }
    }

    /// Returns the target document identifier.
    pub fn id(&self) -> &DocumentId {
        match self {
            ChangeMessage::Added { id, .. }
            | ChangeMessage::Changed { id, .. }
            | ChangeMessage::Removed { id }
            | ChangeMessage::Replace { id, .. } => id,
        }
    }
}
