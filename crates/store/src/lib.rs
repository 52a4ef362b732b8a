//! # Store - offset-addressed blob container
//!
//! A single-file, append-capable container for variable-length byte records.
//! Records are addressed either by a [`Descriptor`] (byte offset) returned
//! from [`FileStore::save`], or by a short textual name registered through
//! [`FileStore::save_named`]. Compiled dictionaries, the application state
//! file and every index region live inside one of these containers.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ HEADER (16 bytes)                                             │
//! │                                                               │
//! │ magic (8 bytes, "mdict\0v1") | dir_offset (u64 LE)            │
//! ├───────────────────────────────────────────────────────────────┤
//! │ RECORDS                                                       │
//! │                                                               │
//! │ crc32 (u32) | capacity (u32) | len (u32) | payload            │
//! │                                                               │
//! │ ... repeated; payload occupies `capacity` bytes of which      │
//! │ the first `len` are valid ...                                 │
//! ├───────────────────────────────────────────────────────────────┤
//! │ DIRECTORY (one ordinary record, pointed to by dir_offset)     │
//! │                                                               │
//! │ count (u32) | repeated: name_len (u8) | name | offset (u64)   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The CRC32 covers `capacity | len |
//! payload[..len]`, detecting silent disk corruption on reads. A record may
//! be updated in place as long as the new payload fits inside the original
//! `capacity`; otherwise a fresh record is appended and a new descriptor
//! issued. Records are never moved while a descriptor references them.
//!
//! `dir_offset == 0` means "no directory yet" (offset 0 is inside the
//! header, so it can never address a real record).
//!
//! ## Write discipline
//!
//! A store opened in [`OpenMode::Create`] or [`OpenMode::CreateOrOpen`] has
//! exactly one writer for its entire lifetime; no internal locking is
//! provided beyond the interior mutex that lets reads go through `&self`.
//! Once [`close`](FileStore::close)d the file is immutable and may be opened
//! read-only by any number of independent readers.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Magic byte sequence every store file begins with.
pub const STORE_MAGIC: &[u8; 8] = b"mdict\0v1";

/// Size of the fixed header: 8 (magic) + 8 (`dir_offset`).
pub const HEADER_BYTES: u64 = 8 + 8;

/// Size of a record header: 4 (crc32) + 4 (capacity) + 4 (len).
const RECORD_HEADER_BYTES: u64 = 4 + 4 + 4;

/// Maximum payload size we'll allocate during reads (64 MiB). Prevents OOM
/// on corrupt length fields.
const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Maximum length of a record name.
const MAX_NAME_BYTES: usize = 255;

/// Errors raised by the store layer.
///
/// Point lookups that are simply misses are not errors — only
/// [`load_named`](FileStore::load_named) on an absent name raises
/// [`StoreError::NotFound`], because the caller asserted presence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file exists but does not start with [`STORE_MAGIC`].
    #[error("invalid store magic in {0}")]
    Format(PathBuf),
    /// On-disk bytes are inconsistent: out-of-bounds offsets, oversized
    /// length fields or CRC32 mismatches.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// A named record was requested but is absent from the directory.
    #[error("no record named '{0}'")]
    NotFound(String),
    /// Operation attempted on a store that has been closed.
    #[error("store is closed")]
    Closed,
    /// Mutating operation attempted on a store opened read-only.
    #[error("store is read-only")]
    ReadOnly,
    /// Interior lock poisoned by a panic in another thread.
    #[error("store lock poisoned")]
    Poisoned,
    /// Underlying read/write failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opaque locator for a stored record: the byte offset of its record header.
///
/// Immutable once issued. Fits in a `u64`, which is what the dictionary
/// indexes store as the first field of their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(u64);

impl Descriptor {
    /// Reconstructs a descriptor from its raw `u64` form (e.g. an index value).
    #[must_use]
    pub fn from_raw(offset: u64) -> Self {
        Descriptor(offset)
    }

    /// Raw byte offset, suitable for packing into a 64-bit index field.
    #[must_use]
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// How to open a [`FileStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file read-only. Fails if absent or bad magic.
    Read,
    /// Create a fresh file, truncating any existing one.
    Create,
    /// Open an existing file for update (validating magic), or create it.
    CreateOrOpen,
}

struct Inner {
    file: File,
    /// Current file length; appends go here.
    len: u64,
    directory: BTreeMap<String, Descriptor>,
    dir_dirty: bool,
    closed: bool,
}

/// Append-capable binary container. See the module docs for the layout.
pub struct FileStore {
    path: PathBuf,
    writable: bool,
    inner: Mutex<Inner>,
}

impl FileStore {
    /// Opens or creates a store at `path`.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Format`] if an existing file's leading bytes do not
    ///   match [`STORE_MAGIC`] (`Read` and `CreateOrOpen` modes).
    /// * [`StoreError::Io`] on any underlying failure.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let create_fresh = match mode {
            OpenMode::Create => true,
            OpenMode::CreateOrOpen => !path.exists(),
            OpenMode::Read => false,
        };

        if create_fresh {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            file.write_all(STORE_MAGIC)?;
            file.write_u64::<LittleEndian>(0)?; // no directory yet
            debug!(path = %path.display(), "created store");
            return Ok(Self {
                path,
                writable: true,
                inner: Mutex::new(Inner {
                    file,
                    len: HEADER_BYTES,
                    directory: BTreeMap::new(),
                    dir_dirty: false,
                    closed: false,
                }),
            });
        }

        let writable = mode != OpenMode::Read;
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)?;
        let len = file.metadata()?.len();

        if len < HEADER_BYTES {
            return Err(StoreError::Format(path));
        }
        let mut magic = [0u8; 8];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::Format(path));
        }
        let dir_offset = file.read_u64::<LittleEndian>()?;

        let mut inner = Inner {
            file,
            len,
            directory: BTreeMap::new(),
            dir_dirty: false,
            closed: false,
        };
        if dir_offset != 0 {
            let bytes = read_record(&mut inner, dir_offset)?;
            inner.directory = parse_directory(&bytes)?;
        }
        debug!(path = %path.display(), records = inner.directory.len(), "opened store");

        Ok(Self {
            path,
            writable,
            inner: Mutex::new(inner),
        })
    }

    /// Path this store was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file size in bytes.
    pub fn size(&self) -> Result<u64, StoreError> {
        let inner = self.lock()?;
        Ok(inner.len)
    }

    /// Appends `bytes` as a new record, or updates `reuse` in place when the
    /// new payload fits within the original record's capacity.
    ///
    /// Returns the descriptor of the record now holding `bytes` — the same
    /// one that was passed in for an in-place update, a fresh one otherwise.
    ///
    /// # Errors
    ///
    /// [`StoreError::ReadOnly`] unless the store was opened for writing;
    /// [`StoreError::Closed`] after [`close`](FileStore::close); otherwise
    /// I/O errors from the underlying file.
    pub fn save(&self, bytes: &[u8], reuse: Option<Descriptor>) -> Result<Descriptor, StoreError> {
        let mut inner = self.lock()?;
        check_open(&inner)?;
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }

        if let Some(desc) = reuse {
            let capacity = record_capacity(&mut inner, desc.0)?;
            if bytes.len() <= capacity {
                write_record_at(&mut inner, desc.0, capacity, bytes)?;
                return Ok(desc);
            }
            // Does not fit: fall through and append. The old record stays
            // where it is but is no longer referenced.
        }

        let offset = inner.len;
        write_record_at(&mut inner, offset, bytes.len(), bytes)?;
        inner.len = offset + RECORD_HEADER_BYTES + bytes.len() as u64;
        Ok(Descriptor(offset))
    }

    /// Loads the payload of the record at `desc`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] if the read would exceed file bounds, a
    /// length field is implausible, or the CRC32 does not match.
    pub fn load(&self, desc: Descriptor) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.lock()?;
        check_open(&inner)?;
        read_record(&mut inner, desc.0)
    }

    /// Reads `length` raw bytes at an absolute file `offset`, bounds-checked.
    ///
    /// Used for leading-magic inspection; ordinary data access should go
    /// through [`load`](FileStore::load), which verifies checksums.
    pub fn load_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.lock()?;
        check_open(&inner)?;
        let end = offset
            .checked_add(length as u64)
            .ok_or_else(|| StoreError::Corrupt("offset overflow".into()))?;
        if end > inner.len {
            return Err(StoreError::Corrupt(format!(
                "read of {} bytes at {} exceeds file size {}",
                length, offset, inner.len
            )));
        }
        inner.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length];
        inner.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Associates `name` with a record holding `bytes`, updating in place
    /// when the name already exists and the payload fits.
    pub fn save_named(&self, name: &str, bytes: &[u8]) -> Result<Descriptor, StoreError> {
        if name.len() > MAX_NAME_BYTES {
            return Err(StoreError::Corrupt(format!(
                "record name exceeds {} bytes",
                MAX_NAME_BYTES
            )));
        }
        let reuse = {
            let inner = self.lock()?;
            check_open(&inner)?;
            inner.directory.get(name).copied()
        };
        let desc = self.save(bytes, reuse)?;
        let mut inner = self.lock()?;
        inner.directory.insert(name.to_string(), desc);
        inner.dir_dirty = true;
        Ok(desc)
    }

    /// Loads the record registered under `name`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no such name exists.
    pub fn load_named(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let desc = {
            let inner = self.lock()?;
            check_open(&inner)?;
            match inner.directory.get(name) {
                Some(d) => *d,
                None => return Err(StoreError::NotFound(name.to_string())),
            }
        };
        self.load(desc)
    }

    /// Returns `true` if a record is registered under `name`.
    pub fn contains_named(&self, name: &str) -> Result<bool, StoreError> {
        let inner = self.lock()?;
        check_open(&inner)?;
        Ok(inner.directory.contains_key(name))
    }

    /// Persists the name directory and fsyncs. No-op when nothing changed.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        check_open(&inner)?;
        flush_inner(&mut inner)
    }

    /// Flushes and marks the store closed. Subsequent operations fail with
    /// [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.closed {
            return Ok(());
        }
        if self.writable {
            flush_inner(&mut inner)?;
            inner.file.sync_all()?;
        }
        inner.closed = true;
        debug!(path = %self.path.display(), "closed store");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Best-effort flush on drop.
///
/// Errors are swallowed because `Drop` cannot propagate them; callers that
/// care about durability must call [`FileStore::close`] explicitly.
impl Drop for FileStore {
    fn drop(&mut self) {
        if !self.writable {
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            if !inner.closed {
                let _ = flush_inner(&mut inner);
                let _ = inner.file.sync_all();
            }
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("writable", &self.writable)
            .finish()
    }
}

fn check_open(inner: &Inner) -> Result<(), StoreError> {
    if inner.closed {
        Err(StoreError::Closed)
    } else {
        Ok(())
    }
}

fn crc_record(capacity: u32, len: u32, payload: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&capacity.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Writes a full record (header + payload) at `offset` with the given
/// payload capacity. `bytes.len() <= capacity` must already hold.
fn write_record_at(inner: &mut Inner, offset: u64, capacity: usize, bytes: &[u8]) -> Result<(), StoreError> {
    let crc = crc_record(capacity as u32, bytes.len() as u32, bytes);
    inner.file.seek(SeekFrom::Start(offset))?;
    inner.file.write_u32::<LittleEndian>(crc)?;
    inner.file.write_u32::<LittleEndian>(capacity as u32)?;
    inner.file.write_u32::<LittleEndian>(bytes.len() as u32)?;
    inner.file.write_all(bytes)?;
    Ok(())
}

/// Header end position of the record at `offset`, or `Corrupt` when the
/// offset is implausible (out of bounds or arithmetically overflowing, as a
/// descriptor from a corrupt index can be).
fn record_header_end(inner: &Inner, offset: u64) -> Result<u64, StoreError> {
    let end = offset
        .checked_add(RECORD_HEADER_BYTES)
        .ok_or_else(|| StoreError::Corrupt(format!("record offset {} overflows", offset)))?;
    if end > inner.len {
        return Err(StoreError::Corrupt(format!(
            "record header at {} exceeds file size {}",
            offset, inner.len
        )));
    }
    Ok(end)
}

/// Reads the capacity field of the record at `offset`, bounds-checked.
fn record_capacity(inner: &mut Inner, offset: u64) -> Result<usize, StoreError> {
    record_header_end(inner, offset)?;
    inner.file.seek(SeekFrom::Start(offset + 4))?;
    let capacity = inner.file.read_u32::<LittleEndian>()? as usize;
    Ok(capacity)
}

fn read_record(inner: &mut Inner, offset: u64) -> Result<Vec<u8>, StoreError> {
    let header_end = record_header_end(inner, offset)?;
    inner.file.seek(SeekFrom::Start(offset))?;
    let crc = inner.file.read_u32::<LittleEndian>()?;
    let capacity = inner.file.read_u32::<LittleEndian>()? as usize;
    let len = inner.file.read_u32::<LittleEndian>()? as usize;

    if capacity > MAX_RECORD_BYTES {
        return Err(StoreError::Corrupt(format!(
            "record capacity {} exceeds maximum {}",
            capacity, MAX_RECORD_BYTES
        )));
    }
    if len > capacity {
        return Err(StoreError::Corrupt(format!(
            "record len {} exceeds capacity {}",
            len, capacity
        )));
    }
    if header_end + capacity as u64 > inner.len {
        return Err(StoreError::Corrupt(format!(
            "record payload at {} exceeds file size {}",
            offset, inner.len
        )));
    }

    let mut payload = vec![0u8; len];
    inner.file.read_exact(&mut payload)?;

    let actual = crc_record(capacity as u32, len as u32, &payload);
    if actual != crc {
        return Err(StoreError::Corrupt(format!(
            "CRC32 mismatch at offset {}: expected {:#010x}, got {:#010x}",
            offset, crc, actual
        )));
    }
    Ok(payload)
}

fn flush_inner(inner: &mut Inner) -> Result<(), StoreError> {
    if !inner.dir_dirty {
        return Ok(());
    }
    let bytes = serialize_directory(&inner.directory);
    let offset = inner.len;
    write_record_at(inner, offset, bytes.len(), &bytes)?;
    inner.len = offset + RECORD_HEADER_BYTES + bytes.len() as u64;

    // Patch the header pointer so readers can find the directory.
    inner.file.seek(SeekFrom::Start(8))?;
    inner.file.write_u64::<LittleEndian>(offset)?;
    inner.file.flush()?;
    inner.dir_dirty = false;
    Ok(())
}

fn serialize_directory(directory: &BTreeMap<String, Descriptor>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(directory.len() as u32)
        .expect("write to Vec cannot fail");
    for (name, desc) in directory {
        buf.push(name.len() as u8);
        buf.extend_from_slice(name.as_bytes());
        buf.write_u64::<LittleEndian>(desc.0)
            .expect("write to Vec cannot fail");
    }
    buf
}

fn parse_directory(bytes: &[u8]) -> Result<BTreeMap<String, Descriptor>, StoreError> {
    let corrupt = || StoreError::Corrupt("truncated directory record".into());
    let mut cursor = std::io::Cursor::new(bytes);
    let count = cursor.read_u32::<LittleEndian>().map_err(|_| corrupt())?;
    let mut directory = BTreeMap::new();
    for _ in 0..count {
        let name_len = cursor.read_u8().map_err(|_| corrupt())? as usize;
        let mut name = vec![0u8; name_len];
        cursor.read_exact(&mut name).map_err(|_| corrupt())?;
        let name = String::from_utf8(name)
            .map_err(|_| StoreError::Corrupt("directory name is not UTF-8".into()))?;
        let offset = cursor.read_u64::<LittleEndian>().map_err(|_| corrupt())?;
        directory.insert(name, Descriptor(offset));
    }
    Ok(directory)
}
