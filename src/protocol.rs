//! Text protocol codec.
//!
//! Requests go out as `<VERB> <KEY><VALUE> ...` with no separator between
//! key and value and no quoting. Replies come back as
//! `<TYPE> <KEY>:<VALUE> <KEY>:"VALUE WITH SPACES" ...`.
//!
//! ```rust
//! use rs_lineus::protocol::{decode, Response};
//!
//! let reply = decode("OK X:800 Y:500 Z:0").unwrap();
//! assert_eq!(reply.tag(), "OK");
//! assert_eq!(reply.fields().get("X"), Some("800"));
//!
//! let err = decode(r#"error INFO:"bad command""#).unwrap();
//! assert!(matches!(err, Response::Error { ref message, .. } if message == "bad command"));
//! ```

use crate::commands::{Command, Value};
use crate::error::ProtocolError;

/// Field name carrying the human readable message of an error reply.
pub const INFO_FIELD: &str = "INFO";

/// Characters that terminate a frame on some transports.
const FRAME_TERMINATORS: &[char] = &['\r', '\n', '\0'];

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a command into its request line.
///
/// Fails if the verb is empty or a text value contains a frame terminator.
pub fn encode(cmd: &Command) -> Result<String, ProtocolError> {
    if cmd.verb().is_empty() {
        return Err(ProtocolError::EmptyVerb);
    }

    let mut line = String::from(cmd.verb());
    for (key, value) in cmd.params() {
        if let Value::Text(text) = value {
            if text.contains(FRAME_TERMINATORS) {
                return Err(ProtocolError::InvalidParam(text.clone()));
            }
        }
        line.push(' ');
        line.push(*key);
        line.push_str(&value.to_string());
    }
    Ok(line)
}

// ============================================================================
// Reply fields
// ============================================================================

/// Ordered `KEY -> VALUE` mapping from a reply.
///
/// Inserting an existing key replaces its value in place, so duplicate keys
/// in a frame resolve to the last occurrence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Exact-key lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Case-insensitive lookup.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True if the key is present (case-insensitive).
    pub fn contains_key(&self, key: &str) -> bool {
        self.get_ignore_case(key).is_some()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in frame order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Same fields with lower-cased keys.
    pub fn to_lowercase_keys(&self) -> Fields {
        self.iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect()
    }
}

impl FromIterator<(String, String)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// A decoded reply frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// `ok` reply.
    Ok {
        /// Type word as received.
        tag: String,
        /// Reply fields.
        fields: Fields,
    },
    /// `error` reply.
    Error {
        /// Type word as received.
        tag: String,
        /// Contents of the `INFO` field, empty if absent.
        message: String,
        /// Reply fields.
        fields: Fields,
    },
    /// Any other type word, e.g. the `hello` handshake.
    Other {
        /// Type word as received.
        tag: String,
        /// Reply fields.
        fields: Fields,
    },
}

impl Response {
    /// Type word as received.
    pub fn tag(&self) -> &str {
        match self {
            Self::Ok { tag, .. } | Self::Error { tag, .. } | Self::Other { tag, .. } => tag,
        }
    }

    /// Reply fields.
    pub fn fields(&self) -> &Fields {
        match self {
            Self::Ok { fields, .. } | Self::Error { fields, .. } | Self::Other { fields, .. } => {
                fields
            }
        }
    }

    /// Consumes the reply, returning its fields.
    pub fn into_fields(self) -> Fields {
        match self {
            Self::Ok { fields, .. } | Self::Error { fields, .. } | Self::Other { fields, .. } => {
                fields
            }
        }
    }

    /// True for an `ok` reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Decodes one reply frame.
///
/// The leading word is the type; the remainder is scanned for
/// `KEY:VALUE` and `KEY:"VALUE"` pairs. Anything that does not match a pair
/// is skipped. Fails only when there is no leading word.
pub fn decode(frame: &str) -> Result<Response, ProtocolError> {
    let frame = frame.trim_matches(FRAME_TERMINATORS);
    let tag_len = word_len(frame);
    if tag_len == 0 {
        return Err(ProtocolError::MissingType(frame.to_string()));
    }

    let tag = frame[..tag_len].to_string();
    let fields = scan_fields(&frame[tag_len..]);

    Ok(if tag.eq_ignore_ascii_case("ok") {
        Response::Ok { tag, fields }
    } else if tag.eq_ignore_ascii_case("error") {
        let message = fields.get_ignore_case(INFO_FIELD).unwrap_or_default().to_string();
        Response::Error {
            tag,
            message,
            fields,
        }
    } else {
        Response::Other { tag, fields }
    })
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte length of the leading `[A-Za-z0-9_]+` run.
fn word_len(s: &str) -> usize {
    s.find(|c: char| !is_word(c)).unwrap_or(s.len())
}

fn scan_fields(rest: &str) -> Fields {
    let mut fields = Fields::new();
    let mut pos = 0;

    while let Some(c) = rest[pos..].chars().next() {
        if c == ' ' {
            if let Some((key, value, consumed)) = match_pair(&rest[pos + 1..]) {
                fields.insert(key, value);
                pos += 1 + consumed;
                continue;
            }
        }
        pos += c.len_utf8();
    }

    fields
}

/// Matches `KEY:VALUE` or `KEY:"VALUE"` at the start of `s`.
/// Returns the key, the value and the number of bytes consumed.
fn match_pair(s: &str) -> Option<(&str, &str, usize)> {
    let key_len = word_len(s);
    if key_len == 0 {
        return None;
    }
    let value_part = s[key_len..].strip_prefix(':')?;

    if let Some(quoted) = value_part.strip_prefix('"') {
        let end = quoted.find('"')?;
        Some((&s[..key_len], &quoted[..end], key_len + 1 + end + 2))
    } else {
        let end = value_part
            .find(|c: char| c == ' ' || c == '"')
            .unwrap_or(value_part.len());
        if end == 0 {
            return None;
        }
        Some((&s[..key_len], &value_part[..end], key_len + 1 + end))
    }
}

// ============================================================================
// Tests
// ============================================================================
