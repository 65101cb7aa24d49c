//! Batch framing.
//!
//! A batch on the wire is a `beginUpdate` frame, zero or more update
//! frames, and an `endUpdate` frame. Every frame names its collection.
//!
//! Frames share one flat map shape:
//!
//! ```text
//! { msg: "beginUpdate", collection, batchSize, reset }
//! { msg: "added",       collection, id, fields }
//! { msg: "changed",     collection, id, fields?, cleared? }
//! { msg: "removed",     collection, id }
//! { msg: "replace",     collection, id, replace? }
//! { msg: "endUpdate",   collection }
//! ```
//!
//! Removed fields of a `changed` message travel in `cleared`; a `replace`
//! without `replace` deletes the document.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ChangeMessage, MessageKind};
use docsync_core::{DocumentId, FieldDelta, Fields};
use serde::{Deserialize, Serialize};

const BEGIN_UPDATE: &str = "beginUpdate";
const END_UPDATE: &str = "endUpdate";

fn batch_size(len: usize) -> ProtocolResult<u32> {
    u32::try_from(len).map_err(|_| ProtocolError::BatchTooLarge { len })
}

/// One frame of the batch framing protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireFrame", try_from = "WireFrame")]
pub enum Frame {
    /// Opens a batch.
    BeginUpdate {
        /// Collection the batch applies to.
        collection: String,
        /// Declared number of update frames.
        batch_size: u32,
        /// Clear the collection before applying the batch.
        reset: bool,
    },
    /// One change message inside a batch.
    Update {
        /// Collection the message applies to.
        collection: String,
        /// The change.
        message: ChangeMessage,
    },
    /// Closes a batch.
    EndUpdate {
        /// Collection the batch applies to.
        collection: String,
    },
}

impl Frame {
    /// Creates a `beginUpdate` frame.
    pub fn begin(collection: impl Into<String>, batch_size: u32, reset: bool) -> Self {
        Frame::BeginUpdate {
            collection: collection.into(),
            batch_size,
            reset,
        }
    }

    /// Creates an update frame.
    pub fn update(collection: impl Into<String>, message: ChangeMessage) -> Self {
        Frame::Update {
            collection: collection.into(),
            message,
        }
    }

    /// Creates an `endUpdate` frame.
    pub fn end(collection: impl Into<String>) -> Self {
        Frame::EndUpdate {
            collection: collection.into(),
        }
    }

    /// Frames a whole batch.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BatchTooLarge`] if the message count does
    /// not fit the `batchSize` field.
    pub fn batch(
        collection: &str,
        reset: bool,
        messages: Vec<ChangeMessage>,
    ) -> ProtocolResult<Vec<Frame>> {
        let mut frames = Vec::with_capacity(messages.len() + 2);
        frames.push(Frame::begin(collection, batch_size(messages.len())?, reset));
        frames.extend(messages.into_iter().map(|m| Frame::update(collection, m)));
        frames.push(Frame::end(collection));
        Ok(frames)
    }

    /// Returns the collection this frame targets.
    pub fn collection(&self) -> &str {
        match self {
            Frame::BeginUpdate { collection, .. }
            | Frame::Update { collection, .. }
            | Frame::EndUpdate { collection } => collection,
        }
    }

    /// Returns the wire tag of this frame.
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::BeginUpdate { .. } => BEGIN_UPDATE,
            Frame::Update { message, .. } => message.kind().as_str(),
            Frame::EndUpdate { .. } => END_UPDATE,
        }
    }

    /// Encodes to CBOR.
    pub fn encode_cbor(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&WireFrame::from(self.clone()), &mut bytes)
            .map_err(|e| ProtocolError::encoding_failed(format!("{e:?}")))?;
        Ok(bytes)
    }

    /// Decodes from CBOR.
    pub fn decode_cbor(bytes: &[u8]) -> ProtocolResult<Self> {
        let wire: WireFrame = ciborium::from_reader(bytes)
            .map_err(|e| ProtocolError::decoding_failed(format!("{e:?}")))?;
        Frame::try_from(wire)
    }

    /// Encodes to JSON.
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(&WireFrame::from(self.clone()))
            .map_err(|e| ProtocolError::encoding_failed(e.to_string()))
    }

    /// Decodes from JSON.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        let wire: WireFrame = serde_json::from_str(json)
            .map_err(|e| ProtocolError::decoding_failed(e.to_string()))?;
        Frame::try_from(wire)
    }

    /// Decodes a JSON array of frames.
    pub fn from_json_array(json: &str) -> ProtocolResult<Vec<Self>> {
        let wires: Vec<WireFrame> = serde_json::from_str(json)
            .map_err(|e| ProtocolError::decoding_failed(e.to_string()))?;
        wires.into_iter().map(Frame::try_from).collect()
    }

    /// Encodes frames as a pretty-printed JSON array.
    pub fn to_json_array(frames: &[Frame]) -> ProtocolResult<String> {
        let wires: Vec<WireFrame> = frames.iter().cloned().map(WireFrame::from).collect();
        serde_json::to_string_pretty(&wires)
            .map_err(|e| ProtocolError::encoding_failed(e.to_string()))
    }
}

/// Flat wire representation shared by all frames.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame {
    msg: String,
    collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cleared: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replace: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reset: Option<bool>,
}

impl From<Frame> for WireFrame {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::BeginUpdate {
                collection,
                batch_size,
                reset,
            } => WireFrame {
                msg: BEGIN_UPDATE.to_string(),
                collection,
                batch_size: Some(batch_size),
                reset: Some(reset),
                ..WireFrame::default()
            },
            Frame::EndUpdate { collection } => WireFrame {
                msg: END_UPDATE.to_string(),
                collection,
                ..WireFrame::default()
            },
            Frame::Update {
                collection,
                message,
            } => {
                let mut wire = WireFrame {
                    msg: message.kind().as_str().to_string(),
                    collection,
                    ..WireFrame::default()
                };
                match message {
                    ChangeMessage::Added { id, fields } => {
                        wire.id = Some(id);
                        wire.fields = Some(fields);
                    }
                    ChangeMessage::Changed { id, fields } => {
                        let mut set = Fields::new();
                        let mut cleared = Vec::new();
                        for (name, value) in fields {
                            match value {
                                Some(value) => {
                                    set.insert(name, value);
                                }
                                None => cleared.push(name),
                            }
                        }
                        wire.id = Some(id);
                        wire.fields = (!set.is_empty()).then_some(set);
                        wire.cleared = (!cleared.is_empty()).then_some(cleared);
                    }
                    ChangeMessage::Removed { id } => wire.id = Some(id),
                    ChangeMessage::Replace { id, replace } => {
                        wire.id = Some(id);
                        wire.replace = replace;
                    }
                }
                wire
            }
        }
    }
}

impl TryFrom<WireFrame> for Frame {
    type Error = ProtocolError;

    fn try_from(wire: WireFrame) -> ProtocolResult<Self> {
        match wire.msg.as_str() {
            BEGIN_UPDATE => {
                let batch_size = wire.batch_size.ok_or(ProtocolError::MissingField {
                    kind: wire.msg.clone(),
                    field: "batchSize",
                })?;
                Ok(Frame::BeginUpdate {
                    collection: wire.collection,
                    batch_size,
                    reset: wire.reset.unwrap_or(false),
                })
            }
            END_UPDATE => Ok(Frame::EndUpdate {
                collection: wire.collection,
            }),
            tag => {
                let kind = MessageKind::from_tag(tag).ok_or_else(|| ProtocolError::UnknownMessage {
                    kind: tag.to_string(),
                })?;
                let id = wire.id.ok_or(ProtocolError::MissingField {
                    kind: tag.to_string(),
                    field: "id",
                })?;
                let message = match kind {
                    MessageKind::Added => ChangeMessage::Added {
                        id,
                        fields: wire.fields.unwrap_or_default(),
                    },
                    MessageKind::Changed => {
                        let mut delta: FieldDelta = wire
                            .fields
                            .unwrap_or_default()
                            .into_iter()
                            .map(|(name, value)| (name, Some(value)))
                            .collect();
                        for name in wire.cleared.unwrap_or_default() {
                            if delta.insert(name.clone(), None).is_some() {
                                return Err(ProtocolError::decoding_failed(format!(
                                    "field {name} is both set and cleared"
                                )));
                            }
                        }
                        ChangeMessage::Changed { id, fields: delta }
                    }
                    MessageKind::Removed => ChangeMessage::Removed { id },
                    MessageKind::Replace => ChangeMessage::Replace {
                        id,
                        replace: wire.replace,
                    },
                };
                Ok(Frame::Update {
                    collection: wire.collection,
                    message,
                })
            }
        }
    }
}
