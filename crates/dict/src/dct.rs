//! DICT (`.dict` + `.idx`) source adapter.
//!
//! A DICT dictionary is two files: a data file holding concatenated UTF-8
//! card bodies, and an index file of entries `word NUL offset(u32 BE)
//! size(u32 BE)` locating each body inside the data file. Either file
//! selects the pair; the sibling is found case-insensitively in the same
//! directory. Each index entry becomes a single-headword card whose body is
//! one text node.

use crate::card::{Card, Node};
use crate::source::Source;
use crate::DictError;
use byteorder::{BigEndian, ByteOrder};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Index entry trailer: offset (u32) + size (u32) after the NUL.
const ENTRY_DESC_BYTES: usize = 8;

/// Largest card body we'll allocate. Guards against corrupt size fields.
const MAX_BODY_BYTES: u32 = 16 * 1024 * 1024;

/// Paired-file DICT source.
pub struct DictSource {
    name: String,
    index: Vec<u8>,
    data: File,
}

impl DictSource {
    /// Opens the pair selected by `path` (either the `.dict` data file or
    /// the `.idx` index file). Returns `None` when the sibling file is
    /// missing, so detection can fall through to "unsupported".
    pub fn open_pair(path: &Path) -> Result<Option<Self>, DictError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let (data_path, index_path) = match ext.as_deref() {
            Some("dict") => match find_sibling(path, "idx")? {
                Some(index) => (path.to_path_buf(), index),
                None => {
                    warn!(path = %path.display(), "matching index file was not found");
                    return Ok(None);
                }
            },
            Some("idx") => match find_sibling(path, "dict")? {
                Some(data) => (data, path.to_path_buf()),
                None => {
                    warn!(path = %path.display(), "matching data file was not found");
                    return Ok(None);
                }
            },
            _ => return Ok(None),
        };

        let name = data_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dictionary")
            .to_string();
        let index = std::fs::read(&index_path)?;
        let data = File::open(&data_path)?;
        Ok(Some(Self { name, index, data }))
    }

    fn read_body(&mut self, offset: u32, size: u32) -> Result<String, DictError> {
        if size > MAX_BODY_BYTES {
            return Err(DictError::Compile(format!(
                "card body of {} bytes exceeds maximum {}",
                size, MAX_BODY_BYTES
            )));
        }
        self.data.seek(SeekFrom::Start(u64::from(offset)))?;
        let mut body = vec![0u8; size as usize];
        self.data.read_exact(&mut body)?;
        String::from_utf8(body)
            .map_err(|_| DictError::Compile("card body is not UTF-8".into()))
    }
}

impl Source for DictSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn language(&self) -> (String, String) {
        ("any".to_string(), "any".to_string())
    }

    fn cards(
        &mut self,
        progress: &mut dyn FnMut(f64),
        sink: &mut dyn FnMut(Card) -> Result<(), DictError>,
    ) -> Result<(), DictError> {
        let total = self.index.len().max(1) as f64;
        let mut pos = 0;

        while pos < self.index.len() {
            let Some(nul) = self.index[pos..].iter().position(|&b| b == 0) else {
                return Err(DictError::Compile("truncated index entry".into()));
            };
            let word_end = pos + nul;
            let word = std::str::from_utf8(&self.index[pos..word_end])
                .map_err(|_| DictError::Compile("index word is not UTF-8".into()))?
                .to_string();

            let desc_start = word_end + 1;
            let desc_end = desc_start + ENTRY_DESC_BYTES;
            if desc_end > self.index.len() {
                return Err(DictError::Compile("truncated index entry".into()));
            }
            let offset = BigEndian::read_u32(&self.index[desc_start..]);
            let size = BigEndian::read_u32(&self.index[desc_start + 4..]);
            pos = desc_end;

            let body = self.read_body(offset, size)?;
            let mut root = Node::tag("root");
            root.children
                .push(Node::text(body.trim_end_matches(['\n', '\r'])));
            sink(Card::new(vec![word], root))?;
            progress(pos as f64 / total);
        }
        progress(1.0);
        Ok(())
    }
}

/// Case-insensitive search of `path`'s directory for a file with the same
/// stem and the given extension.
fn find_sibling(path: &Path, ext: &str) -> Result<Option<PathBuf>, DictError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let wanted = format!("{}.{}", stem, ext).to_lowercase();
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());

    for entry in std::fs::read_dir(dir.unwrap_or(Path::new(".")))? {
        let candidate = entry?.path();
        let matches = candidate
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_lowercase() == wanted);
        if matches {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::NodeValue;
    use byteorder::WriteBytesExt;

    /// Writes a `.dict`/`.idx` pair; bodies are laid out back to back.
    fn write_pair(dir: &Path, stem: &str, entries: &[(&str, &str)]) -> PathBuf {
        let mut data = Vec::new();
        let mut index = Vec::new();
        for (word, body) in entries {
            index.extend_from_slice(word.as_bytes());
            index.push(0);
            index.write_u32::<BigEndian>(data.len() as u32).unwrap();
            index.write_u32::<BigEndian>(body.len() as u32).unwrap();
            data.extend_from_slice(body.as_bytes());
        }
        let data_path = dir.join(format!("{}.dict", stem));
        std::fs::write(&data_path, data).unwrap();
        std::fs::write(dir.join(format!("{}.idx", stem)), index).unwrap();
        data_path
    }

    fn collect_cards(source: &mut DictSource) -> Vec<Card> {
        let mut cards = Vec::new();
        source
            .cards(&mut |_| {}, &mut |card| {
                cards.push(card);
                Ok(())
            })
            .unwrap();
        cards
    }

    #[test]
    fn pair_streams_single_word_cards() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = write_pair(
            dir.path(),
            "webster",
            &[("cat", "a feline\n"), ("dog", "a canine\r\n")],
        );

        let mut source = DictSource::open_pair(&data_path).unwrap().unwrap();
        assert_eq!(source.name(), "webster");

        let cards = collect_cards(&mut source);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].words, vec!["cat"]);
        assert_eq!(
            cards[0].body.children[0].value,
            Some(NodeValue::Text("a feline".into()))
        );
        assert_eq!(cards[1].words, vec!["dog"]);
    }

    #[test]
    fn index_file_selects_the_same_pair() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), "webster", &[("cat", "a feline")]);

        let mut source = DictSource::open_pair(&dir.path().join("webster.idx"))
            .unwrap()
            .unwrap();
        assert_eq!(source.name(), "webster");
        assert_eq!(collect_cards(&mut source).len(), 1);
    }

    #[test]
    fn sibling_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("webster.dict");
        std::fs::write(&data_path, b"a feline").unwrap();
        let mut index = b"cat\0".to_vec();
        index.write_u32::<BigEndian>(0).unwrap();
        index.write_u32::<BigEndian>(8).unwrap();
        std::fs::write(dir.path().join("Webster.IDX"), index).unwrap();

        assert!(DictSource::open_pair(&data_path).unwrap().is_some());
    }

    #[test]
    fn missing_sibling_is_not_a_pair() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("orphan.dict");
        std::fs::write(&data_path, b"body").unwrap();

        assert!(DictSource::open_pair(&data_path).unwrap().is_none());
    }

    #[test]
    fn truncated_index_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.dict"), b"body").unwrap();
        // word + NUL but only half a descriptor
        std::fs::write(dir.path().join("bad.idx"), b"cat\0\0\0\0\0").unwrap();

        let mut source = DictSource::open_pair(&dir.path().join("bad.dict"))
            .unwrap()
            .unwrap();
        let result = source.cards(&mut |_| {}, &mut |_| Ok(()));
        assert!(matches!(result, Err(DictError::Compile(_))));
    }

    #[test]
    fn body_past_data_end_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.dict"), b"tiny").unwrap();
        let mut index = b"cat\0".to_vec();
        index.write_u32::<BigEndian>(0).unwrap();
        index.write_u32::<BigEndian>(4096).unwrap();
        std::fs::write(dir.path().join("bad.idx"), index).unwrap();

        let mut source = DictSource::open_pair(&dir.path().join("bad.dict"))
            .unwrap()
            .unwrap();
        let result = source.cards(&mut |_| {}, &mut |_| Ok(()));
        assert!(matches!(result, Err(DictError::Io(_))));
    }
}
