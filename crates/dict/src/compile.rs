//! Two-phase dictionary compiler.
//!
//! Phase 1 streams cards out of the source adapter, sorts each card's
//! headwords, and persists the card blobs (progress `[0, 0.5]`). Phase 2
//! sorts every `(word, card)` pair globally, assigns each word its dense
//! zero-based ordinal, re-saves each card with its ordinals filled in, and
//! builds both indexes (progress `[0.5, 1]`).
//!
//! The compiler writes directly to `dst`. Callers wanting atomic installs
//! pass a temporary path and rename after a successful return; on error the
//! temporary file is theirs to remove.

use crate::source::{detect, Source};
use crate::{
    Card, DictError, Dictionary, Info, OrdinalIndex, WordIndex, INFO_NAME, ORDINAL_INDEX_NAME,
    WORD_INDEX_NAME,
};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use store::{Descriptor, FileStore, OpenMode, STORE_MAGIC};
use tracing::{debug, info};

/// Copy chunk size for the already-compiled fast path.
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// One card persisted in phase 1, waiting for its ordinals.
struct Slot {
    desc: Descriptor,
    numbers: Vec<u32>,
}

/// Deduplicating progress reporter. Fractions are rounded to three decimal
/// places and forwarded only when the rounded value changes, so a caller
/// driving a progress bar is not flooded by per-card callbacks.
struct Reporter<F: FnMut(f64)> {
    report: F,
    last: f64,
}

impl<F: FnMut(f64)> Reporter<F> {
    fn new(report: F) -> Self {
        Self { report, last: -1.0 }
    }

    fn update(&mut self, value: f64) {
        let rounded = (value * 1000.0).round() / 1000.0;
        if rounded != self.last {
            self.last = rounded;
            (self.report)(rounded);
        }
    }
}

/// Compiles the source file at `src` into a dictionary file at `dst` and
/// opens the result.
///
/// If `src` is already a compiled dictionary (store magic at offset zero)
/// it is copied byte for byte instead of recompiled. `report` receives a
/// monotonic fraction in `[0, 1]`, final `1.0` included.
///
/// # Errors
///
/// [`DictError::Compile`] when no adapter recognizes `src`; in that case no
/// output file is created.
pub fn compile<F: FnMut(f64)>(src: &Path, dst: &Path, report: F) -> Result<Dictionary, DictError> {
    if is_compiled(src)? {
        debug!(src = %src.display(), "source is already compiled, copying");
        let mut reporter = Reporter::new(report);
        copy_compiled(src, dst, &mut reporter)?;
        reporter.update(1.0);
        return Dictionary::open(dst);
    }

    // Resolve the adapter before touching dst: an unrecognized source must
    // not leave an empty output file behind.
    let mut source = detect(src)?.ok_or_else(|| {
        DictError::Compile(format!("unsupported dictionary source: {}", src.display()))
    })?;
    compile_source(source.as_mut(), dst, report)
}

/// Compiles an already-opened source into a dictionary file at `dst` and
/// opens the result.
///
/// # Errors
///
/// [`DictError::Compile`] when a card has no headwords or when a card's
/// word count exceeds the index position width.
pub fn compile_source<F: FnMut(f64)>(
    source: &mut dyn Source,
    dst: &Path,
    report: F,
) -> Result<Dictionary, DictError> {
    let mut reporter = Reporter::new(report);
    let name = source.name();
    let language = source.language();
    info!(name = %name, dst = %dst.display(), "compiling dictionary");

    let store = FileStore::open(dst, OpenMode::Create)?;

    // Phase 1: persist card blobs, collect (word, slot) pairs.
    let mut slots: Vec<Slot> = Vec::new();
    let mut pairs: Vec<(String, usize)> = Vec::new();
    {
        let mut phase1 = |fraction: f64| reporter.update(fraction / 2.0);
        let mut sink = |mut card: Card| -> Result<(), DictError> {
            if card.words.is_empty() {
                return Err(DictError::Compile("card has no headwords".into()));
            }
            if card.words.len() > u16::MAX as usize {
                return Err(DictError::Compile(format!(
                    "card has {} headwords, more than an index entry can address",
                    card.words.len()
                )));
            }
            card.words.sort();
            card.numbers.clear();
            let desc = store.save(&card.to_blob()?, None)?;
            let slot_idx = slots.len();
            for word in &card.words {
                pairs.push((word.clone(), slot_idx));
            }
            slots.push(Slot {
                desc,
                numbers: Vec::new(),
            });
            Ok(())
        };
        source.cards(&mut phase1, &mut sink)?;
    }

    // Global ordinal assignment. The sort is stable, so words within one
    // card keep their local sorted order and each slot's ordinals land
    // parallel to its sorted word list.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    for (ordinal, (_, slot_idx)) in pairs.iter().enumerate() {
        slots[*slot_idx].numbers.push(ordinal as u32);
    }
    let size = pairs.len() as u32;
    drop(pairs);

    // Phase 2: re-save each card with its ordinals, build both indexes.
    let mut word_index = WordIndex::create(WORD_INDEX_NAME);
    let mut ordinal_index = OrdinalIndex::create(ORDINAL_INDEX_NAME);
    let total = slots.len().max(1) as f64;
    for (done, slot) in slots.iter().enumerate() {
        let mut card = Card::from_blob(&store.load(slot.desc)?)?;
        card.numbers = slot.numbers.clone();
        let desc = store.save(&card.to_blob()?, Some(slot.desc))?;

        for (pos, word) in card.words.iter().enumerate() {
            let entry = (desc.to_raw(), pos as u16);
            word_index.set(&word.as_bytes().to_vec(), &entry);
            ordinal_index.set(&card.numbers[pos], &entry);
        }
        reporter.update(0.5 + (done + 1) as f64 / total / 2.0);
    }

    let info = Info {
        name,
        language,
        size,
    };
    let info_bytes = serde_json::to_vec(&info)
        .map_err(|e| DictError::Decode(format!("info serialization failed: {}", e)))?;
    store.save_named(INFO_NAME, &info_bytes)?;
    word_index.save(&store)?;
    ordinal_index.save(&store)?;
    store.close()?;

    reporter.update(1.0);
    info!(name = %info.name, words = size, "dictionary compiled");
    Dictionary::open(dst)
}

fn is_compiled(src: &Path) -> Result<bool, DictError> {
    let mut file = File::open(src)?;
    let mut magic = [0u8; STORE_MAGIC.len()];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == STORE_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn copy_compiled<F: FnMut(f64)>(
    src: &Path,
    dst: &Path,
    reporter: &mut Reporter<F>,
) -> Result<(), DictError> {
    let mut input = File::open(src)?;
    let total = input.metadata()?.len().max(1) as f64;
    let mut output = File::create(dst)?;

    let mut buf = vec![0u8; COPY_CHUNK_BYTES];
    let mut copied = 0u64;
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n])?;
        copied += n as u64;
        reporter.update(copied as f64 / total);
    }
    output.sync_all()?;
    Ok(())
}
