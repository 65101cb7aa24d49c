//! Document identifier.

use crate::error::{CoreError, CoreResult};
use rand::Rng;
use std::fmt;

/// Characters used for generated identifiers. Visually ambiguous
/// characters (0, 1, I, O, l, ...) are left out.
const UNAMBIGUOUS_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of generated identifiers.
const RANDOM_ID_LEN: usize = 17;

/// Identifier of a document.
///
/// Identifiers are either free-form text or 12-byte object ids. They are
/// immutable once a document is stored. On the wire an identifier is
/// carried in its *source-encoded* string form, see [`DocumentId::stringify`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentId {
    /// Text identifier.
    Text(String),
    /// 12-byte object id.
    ObjectId([u8; 12]),
}

impl DocumentId {
    /// Creates a text identifier.
    pub fn text(id: impl Into<String>) -> Self {
        DocumentId::Text(id.into())
    }

    /// Generates a fresh random text identifier.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let id: String = (0..RANDOM_ID_LEN)
            .map(|_| char::from(UNAMBIGUOUS_CHARS[rng.gen_range(0..UNAMBIGUOUS_CHARS.len())]))
            .collect();
        DocumentId::Text(id)
    }

    /// Returns the source-encoded string form.
    ///
    /// - object ids render as 24 lowercase hex characters;
    /// - text ids that could be confused with another encoding (a leading
    ///   `-`, `~` or `{`, or exactly 24 lowercase hex characters) get a
    ///   `-` prefix;
    /// - all other text ids, including the empty id, are unchanged.
    pub fn stringify(&self) -> String {
        match self {
            DocumentId::ObjectId(bytes) => to_hex(bytes),
            DocumentId::Text(s) if s.is_empty() => String::new(),
            DocumentId::Text(s) => {
                if s.starts_with('-')
                    || s.starts_with('~')
                    || s.starts_with('{')
                    || looks_like_object_id(s)
                {
                    format!("-{s}")
                } else {
                    s.clone()
                }
            }
        }
    }

    /// Parses a source-encoded identifier produced by [`stringify`](Self::stringify).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] for the bare `-` (an encoded
    /// "no id") and for `~`-prefixed JSON-encoded identifiers, which
    /// this implementation does not produce.
    pub fn parse(encoded: &str) -> CoreResult<Self> {
        if encoded.is_empty() {
            return Ok(DocumentId::Text(String::new()));
        }
        if encoded == "-" {
            return Err(CoreError::invalid_id("'-' encodes a missing identifier"));
        }
        if let Some(rest) = encoded.strip_prefix('-') {
            return Ok(DocumentId::Text(rest.to_string()));
        }
        if encoded.starts_with('~') {
            return Err(CoreError::invalid_id(format!(
                "unsupported JSON-encoded identifier {encoded}"
            )));
        }
        if looks_like_object_id(encoded) {
            return from_hex(encoded).map(DocumentId::ObjectId);
        }
        Ok(DocumentId::Text(encoded.to_string()))
    }

    /// Returns the text form if this is a text identifier.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DocumentId::Text(s) => Some(s),
            DocumentId::ObjectId(_) => None,
        }
    }
}

fn looks_like_object_id(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn from_hex(s: &str) -> CoreResult<[u8; 12]> {
    let mut out = [0u8; 12];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).map_err(|_| CoreError::invalid_id(s))?;
        out[i] = u8::from_str_radix(pair, 16).map_err(|_| CoreError::invalid_id(s))?;
    }
    Ok(out)
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Text(s) => write!(f, "DocumentId({s:?})"),
            DocumentId::ObjectId(_) => write!(f, "ObjectId({})", self.stringify()),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId::Text(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        DocumentId::Text(s)
    }
}

impl From<[u8; 12]> for DocumentId {
    fn from(bytes: [u8; 12]) -> Self {
        DocumentId::ObjectId(bytes)
    }
}

impl serde::Serialize for DocumentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.stringify())
    }
}

impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        DocumentId::parse(&encoded).map_err(serde::de::Error::custom)
    }
}
