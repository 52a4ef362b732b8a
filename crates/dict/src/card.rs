//! Card model and blob serialization.
//!
//! A card is one dictionary entry: its headwords, a tree of markup nodes,
//! and (after compilation) the global ordinals assigned to its words. Cards
//! are stored inside the dictionary file as zlib-compressed JSON records,
//! one per card.

use crate::DictError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Scalar attached to a markup node: text for most tags, a number for
/// indent levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValue {
    Number(i64),
    Text(String),
}

/// One node of a card's markup tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<NodeValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    /// Container node with no value.
    #[must_use]
    pub fn tag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            children: Vec::new(),
        }
    }

    /// Container node carrying a value (e.g. an indent level).
    #[must_use]
    pub fn with_value(name: &str, value: NodeValue) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value),
            children: Vec::new(),
        }
    }

    /// Leaf text node.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            name: "text".to_string(),
            value: Some(NodeValue::Text(text.to_string())),
            children: Vec::new(),
        }
    }
}

/// One dictionary entry.
///
/// `words` is kept sorted by the compiler; `numbers` is empty until global
/// ordinal assignment and then runs parallel to `words` (the ordinal of
/// `words[i]` is `numbers[i]`). Cards are immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub words: Vec<String>,
    pub body: Node,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numbers: Vec<u32>,
}

impl Card {
    #[must_use]
    pub fn new(words: Vec<String>, body: Node) -> Self {
        Self {
            words,
            body,
            numbers: Vec::new(),
        }
    }

    /// Serializes the card to its on-disk form (zlib-compressed JSON).
    pub fn to_blob(&self) -> Result<Vec<u8>, DictError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| DictError::Decode(format!("card serialization failed: {}", e)))?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Deserializes a card from its on-disk form.
    ///
    /// # Errors
    ///
    /// [`DictError::Decode`] if the bytes are not valid zlib or the inflated
    /// payload is not a well-formed card.
    pub fn from_blob(bytes: &[u8]) -> Result<Self, DictError> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| DictError::Decode(format!("card decompression failed: {}", e)))?;
        serde_json::from_slice(&json)
            .map_err(|e| DictError::Decode(format!("card deserialization failed: {}", e)))
    }
}
