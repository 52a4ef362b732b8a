//! # Dict - compiled dictionary engine
//!
//! Compiles heterogeneous dictionary sources into a single immutable,
//! dual-indexed container and serves exact and range lookups against it.
//!
//! ## Architecture
//!
//! ```text
//! source adapter (dsl, dict)     [source.rs, dsl.rs, dct.rs]
//!        |
//!        v  stream of cards
//! ┌───────────────────────────────────────────────┐
//! │ COMPILER                        [compile.rs]  │
//! │                                               │
//! │ phase 1: sort words, persist compressed       │
//! │          card bodies           (progress 0‒½) │
//! │ phase 2: global ordinal assignment,           │
//! │          re-save cards, build both            │
//! │          indexes               (progress ½‒1) │
//! └───────────────────────────────────────────────┘
//!        |
//!        v  one FileStore: card blobs + info record
//!           + word index + ordinal index
//! ┌───────────────────────────────────────────────┐
//! │ LOOKUP                           [lookup.rs]  │
//! │   by_word / by_word_range / by_ordinal_range  │
//! └───────────────────────────────────────────────┘
//!        |
//!        v  word indexes of many open dictionaries
//!       completion merge              [merge.rs]
//! ```
//!
//! The word index maps UTF-8 headword bytes to `(card descriptor, word
//! position)`; the ordinal index maps a dense zero-based rank to the same
//! value shape. Because ordinals are assigned in globally sorted word
//! order, a scan over `[ordinal(a), ordinal(b))` walks the dictionary
//! alphabetically without re-sorting at query time.

mod card;
mod compile;
mod dct;
mod dsl;
mod lookup;
mod merge;
mod source;

pub use card::{Card, Node, NodeValue};
pub use compile::{compile, compile_source};
pub use dct::DictSource;
pub use dsl::DslSource;
pub use lookup::CardRange;
pub use merge::complete;
pub use source::{detect, Source};

use index::codec::{BeU16, BeU32, BeU64, Pair, RawBytes};
use index::{IndexError, Mapping};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use store::{Descriptor, FileStore, OpenMode, StoreError};
use thiserror::Error;
use tracing::debug;

/// Named record holding dictionary metadata.
pub const INFO_NAME: &str = "mdict::info";
/// Named record holding the word index region.
pub const WORD_INDEX_NAME: &str = "mdict::word_index";
/// Named record holding the ordinal index region.
pub const ORDINAL_INDEX_NAME: &str = "mdict::ordinal_index";

/// Both indexes share one value shape: `(card descriptor, position)`.
pub(crate) type WordIndex = Mapping<RawBytes, Pair<BeU64, BeU16>>;
pub(crate) type OrdinalIndex = Mapping<BeU32, Pair<BeU64, BeU16>>;

/// Errors raised by the dictionary layer.
#[derive(Debug, Error)]
pub enum DictError {
    /// Unsupported or malformed dictionary source.
    #[error("compile error: {0}")]
    Compile(String),
    /// Stored card bytes inconsistent with the expected encoding.
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Dictionary metadata, stored once as JSON under [`INFO_NAME`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Info {
    name: String,
    language: (String, String),
    size: u32,
}

/// An open compiled dictionary: one [`FileStore`] plus its two indexes.
///
/// All lookups are read-only and safe to repeat; a compiled file is
/// immutable and may be opened by any number of independent readers.
pub struct Dictionary {
    path: PathBuf,
    store: FileStore,
    word_index: WordIndex,
    ordinal_index: OrdinalIndex,
    name: String,
    language: (String, String),
    size: u32,
}

impl Dictionary {
    /// Opens a compiled dictionary file read-only.
    ///
    /// # Errors
    ///
    /// [`StoreError::Format`] (via [`DictError::Store`]) on bad magic;
    /// [`DictError::Decode`] if the metadata record is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DictError> {
        let path = path.as_ref().to_path_buf();
        let store = FileStore::open(&path, OpenMode::Read)?;

        let info_bytes = store.load_named(INFO_NAME)?;
        let info: Info = serde_json::from_slice(&info_bytes)
            .map_err(|e| DictError::Decode(format!("malformed dictionary info: {}", e)))?;

        let word_index = WordIndex::open(&store, WORD_INDEX_NAME)?;
        let ordinal_index = OrdinalIndex::open(&store, ORDINAL_INDEX_NAME)?;
        debug!(name = %info.name, size = info.size, "opened dictionary");

        Ok(Self {
            path,
            store,
            word_index,
            ordinal_index,
            name: info.name,
            language: info.language,
            size: info.size,
        })
    }

    /// Dictionary display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(source, target)` language pair.
    #[must_use]
    pub fn language(&self) -> (&str, &str) {
        (&self.language.0, &self.language.1)
    }

    /// Total word count (= number of assigned ordinals).
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Path of the compiled file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the compiled file in bytes.
    pub fn file_size(&self) -> Result<u64, DictError> {
        Ok(self.store.size()?)
    }

    /// Releases the underlying file handle.
    pub fn close(&self) -> Result<(), DictError> {
        Ok(self.store.close()?)
    }

    pub(crate) fn word_index(&self) -> &WordIndex {
        &self.word_index
    }

    pub(crate) fn ordinal_index(&self) -> &OrdinalIndex {
        &self.ordinal_index
    }

    /// Loads and decompresses the card referenced by `desc`.
    pub(crate) fn load_card(&self, desc: u64) -> Result<Card, DictError> {
        let bytes = self.store.load(Descriptor::from_raw(desc))?;
        Card::from_blob(&bytes)
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("name", &self.name)
            .field("language", &self.language)
            .field("size", &self.size)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests;
