//! # Index - persistent ordered mapping
//!
//! A sorted associative index layered on a [`store::FileStore`], keyed and
//! valued through the order-preserving codecs in [`codec`]. A compiled
//! dictionary carries two of these (word index, ordinal index); the
//! application state store carries the history counters as two more.
//!
//! ## Model
//!
//! The mapping holds its entries in an in-memory `BTreeMap` of
//! codec-encoded keys and values, loaded in one pass from a single named
//! store record at [`open`](Mapping::open) and written back by
//! [`save`](Mapping::save). Point operations are `O(log n)` against the
//! tree; range scans position in `O(log n)` and stream in order. Because
//! every codec is byte-order preserving, the tree's raw byte ordering *is*
//! the codec's total order.
//!
//! ## Persisted layout (one store record)
//!
//! ```text
//! key_tag_len (u16) | key_tag | val_tag_len (u16) | val_tag
//! count (u64)
//! repeated: key_len (u32) | key | val_len (u32) | val     (ascending keys)
//! ```
//!
//! All integers little-endian (framing only — key bytes themselves use the
//! codec's big-endian forms). The codec tags are checked on open: a mapping
//! created with one codec pair can never be silently read with another.

pub mod codec;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use codec::Codec;
use std::collections::BTreeMap;
use std::io::Read;
use std::marker::PhantomData;
use std::ops::Bound;
use store::{FileStore, StoreError};
use thiserror::Error;

/// Maximum encoded key size (64 KiB). Prevents OOM on corrupt records.
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum encoded value size (16 MiB). Prevents OOM on corrupt records.
const MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

/// Errors raised by the mapping layer.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Stored bytes are not a well-formed encoding for the declared codec.
    #[error("decode error: {0}")]
    Decode(String),
    /// The persisted mapping was created with different codecs.
    #[error("codec mismatch for mapping '{name}': stored {stored}, expected {expected}")]
    CodecMismatch {
        name: String,
        stored: String,
        expected: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistent ordered mapping with codec-typed keys and values.
///
/// Key order is the codec's total order at all times, independent of
/// insertion order. Keys are unique; [`set`](Mapping::set) overwrites.
pub struct Mapping<K: Codec, V: Codec> {
    name: String,
    tree: BTreeMap<Vec<u8>, Vec<u8>>,
    _codecs: PhantomData<(K, V)>,
}

impl<K: Codec, V: Codec> Mapping<K, V> {
    /// Creates a fresh, empty mapping named `name` (not yet persisted).
    #[must_use]
    pub fn create(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tree: BTreeMap::new(),
            _codecs: PhantomData,
        }
    }

    /// Opens the mapping persisted under `name` in `store`, or an empty one
    /// if the store has no such record yet.
    ///
    /// # Errors
    ///
    /// [`IndexError::CodecMismatch`] if the persisted codec tags differ from
    /// `K`/`V`; [`IndexError::Decode`] on a malformed record.
    pub fn open(store: &FileStore, name: &str) -> Result<Self, IndexError> {
        let bytes = match store.load_named(name) {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => return Ok(Self::create(name)),
            Err(e) => return Err(e.into()),
        };
        let tree = parse_mapping(name, &bytes, &K::tag(), &V::tag())?;
        Ok(Self {
            name: name.to_string(),
            tree,
            _codecs: PhantomData,
        })
    }

    /// Persists the mapping as the named record `name` in `store`.
    pub fn save(&self, store: &FileStore) -> Result<(), IndexError> {
        let mut buf = Vec::new();
        write_tag(&mut buf, &K::tag());
        write_tag(&mut buf, &V::tag());
        buf.write_u64::<LittleEndian>(self.tree.len() as u64)
            .expect("write to Vec cannot fail");
        for (k, v) in &self.tree {
            buf.write_u32::<LittleEndian>(k.len() as u32)
                .expect("write to Vec cannot fail");
            buf.extend_from_slice(k);
            buf.write_u32::<LittleEndian>(v.len() as u32)
                .expect("write to Vec cannot fail");
            buf.extend_from_slice(v);
        }
        store.save_named(&self.name, &buf)?;
        Ok(())
    }

    /// Mapping name (the store record it persists under).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point lookup. An absent key is a `None`, not an error.
    pub fn get(&self, key: &K::Item) -> Result<Option<V::Item>, IndexError> {
        let mut kb = Vec::new();
        K::encode(key, &mut kb);
        match self.tree.get(&kb) {
            Some(v) => Ok(Some(V::decode(v)?)),
            None => Ok(None),
        }
    }

    /// Inserts or overwrites.
    pub fn set(&mut self, key: &K::Item, value: &V::Item) {
        let mut kb = Vec::new();
        K::encode(key, &mut kb);
        let mut vb = Vec::new();
        V::encode(value, &mut vb);
        self.tree.insert(kb, vb);
    }

    /// Removes `key`, returning whether it was present. No-op if absent.
    pub fn remove(&mut self, key: &K::Item) -> bool {
        let mut kb = Vec::new();
        K::encode(key, &mut kb);
        self.tree.remove(&kb).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Ascending iteration over all `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = Result<(K::Item, V::Item), IndexError>> + '_ {
        self.tree.iter().map(|(k, v)| Ok((K::decode(k)?, V::decode(v)?)))
    }

    /// Lazy ascending scan over `start <= key < stop` in codec order.
    ///
    /// `start = None` means "from the first key", `stop = None` "to the last
    /// key". Restartable — calling again yields a fresh scan.
    pub fn range(
        &self,
        start: Option<&K::Item>,
        stop: Option<&K::Item>,
    ) -> impl Iterator<Item = Result<(K::Item, V::Item), IndexError>> + '_ {
        let lower = match start {
            Some(k) => {
                let mut kb = Vec::new();
                K::encode(k, &mut kb);
                Bound::Included(kb)
            }
            None => Bound::Unbounded,
        };
        let upper = match stop {
            Some(k) => {
                let mut kb = Vec::new();
                K::encode(k, &mut kb);
                Bound::Excluded(kb)
            }
            None => Bound::Unbounded,
        };
        self.tree
            .range((lower, upper))
            .map(|(k, v)| Ok((K::decode(k)?, V::decode(v)?)))
    }
}

impl<K: Codec, V: Codec> std::fmt::Debug for Mapping<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("name", &self.name)
            .field("len", &self.tree.len())
            .field("key_codec", &K::tag())
            .field("value_codec", &V::tag())
            .finish()
    }
}

fn write_tag(buf: &mut Vec<u8>, tag: &str) {
    buf.write_u16::<LittleEndian>(tag.len() as u16)
        .expect("write to Vec cannot fail");
    buf.extend_from_slice(tag.as_bytes());
}

fn read_tag(cursor: &mut std::io::Cursor<&[u8]>) -> Result<String, IndexError> {
    let len = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| IndexError::Decode("truncated mapping header".into()))? as usize;
    let mut raw = vec![0u8; len];
    cursor
        .read_exact(&mut raw)
        .map_err(|_| IndexError::Decode("truncated codec tag".into()))?;
    String::from_utf8(raw).map_err(|_| IndexError::Decode("codec tag is not UTF-8".into()))
}

fn parse_mapping(
    name: &str,
    bytes: &[u8],
    key_tag: &str,
    val_tag: &str,
) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, IndexError> {
    let mut cursor = std::io::Cursor::new(bytes);

    let stored_key = read_tag(&mut cursor)?;
    let stored_val = read_tag(&mut cursor)?;
    if stored_key != key_tag || stored_val != val_tag {
        return Err(IndexError::CodecMismatch {
            name: name.to_string(),
            stored: format!("{} -> {}", stored_key, stored_val),
            expected: format!("{} -> {}", key_tag, val_tag),
        });
    }

    let count = cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| IndexError::Decode("truncated mapping header".into()))?;

    let mut tree = BTreeMap::new();
    for _ in 0..count {
        let klen = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| IndexError::Decode("truncated mapping entry".into()))?
            as usize;
        if klen > MAX_KEY_BYTES {
            return Err(IndexError::Decode(format!(
                "key length {} exceeds maximum {}",
                klen, MAX_KEY_BYTES
            )));
        }
        let mut k = vec![0u8; klen];
        cursor
            .read_exact(&mut k)
            .map_err(|_| IndexError::Decode("truncated mapping key".into()))?;

        let vlen = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| IndexError::Decode("truncated mapping entry".into()))?
            as usize;
        if vlen > MAX_VALUE_BYTES {
            return Err(IndexError::Decode(format!(
                "value length {} exceeds maximum {}",
                vlen, MAX_VALUE_BYTES
            )));
        }
        let mut v = vec![0u8; vlen];
        cursor
            .read_exact(&mut v)
            .map_err(|_| IndexError::Decode("truncated mapping value".into()))?;

        tree.insert(k, v);
    }
    Ok(tree)
}
