//! K-way completion merge across the word indexes of open dictionaries.
//!
//! Each dictionary contributes one ascending scan positioned at the prefix;
//! a min-heap interleaves the scans so the combined stream stays sorted
//! without materializing any index. Duplicates across dictionaries are
//! kept, one per dictionary, so the caller can see which words several
//! dictionaries agree on.

use crate::Dictionary;
use index::IndexError;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

type WordScan<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, (u64, u16)), IndexError>> + 'a>;

struct HeapEntry {
    key: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed: BinaryHeap is a max-heap, the merge needs the smallest key
    // first. Ties break toward the earlier source for a stable order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Next in-prefix key of `scan`, skipping undecodable entries.
fn next_key(scan: &mut WordScan<'_>) -> Option<Vec<u8>> {
    for entry in scan {
        if let Ok((key, _)) = entry {
            return Some(key);
        }
    }
    None
}

/// Collects up to `limit` completions of `prefix` across `dicts`, in
/// ascending order. An empty prefix completes to nothing.
pub fn complete<'a, I>(dicts: I, prefix: &str, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a Dictionary>,
{
    if prefix.is_empty() || limit == 0 {
        return Vec::new();
    }
    let prefix_bytes = prefix.as_bytes();

    let mut scans: Vec<WordScan<'a>> = dicts
        .into_iter()
        .map(|dict| {
            Box::new(dict.word_index().range(Some(&prefix_bytes.to_vec()), None)) as WordScan<'a>
        })
        .collect();

    let mut heap = BinaryHeap::with_capacity(scans.len());
    for (source, scan) in scans.iter_mut().enumerate() {
        if let Some(key) = next_key(scan) {
            heap.push(HeapEntry { key, source });
        }
    }

    let mut out = Vec::new();
    while let Some(HeapEntry { key, source }) = heap.pop() {
        // Scans are ascending, so the first key past the prefix ends that
        // source for good.
        if !key.starts_with(prefix_bytes) {
            continue;
        }
        out.push(String::from_utf8_lossy(&key).into_owned());
        if out.len() >= limit {
            break;
        }
        if let Some(key) = next_key(&mut scans[source]) {
            heap.push(HeapEntry { key, source });
        }
    }
    out
}
