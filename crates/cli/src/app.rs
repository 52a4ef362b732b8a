//! Application state: the dictionary directory and lookup history.
//!
//! An [`App`] owns one data directory holding every installed dictionary
//! (`<name>.mdict`) plus `state.mdict`, a store whose two mappings count
//! lookups. The ranked mapping keys on `(u64::MAX - count, word)` so an
//! ascending scan yields the most frequent words first without sorting.
//!
//! Installs are atomic at the filesystem level: the compiler writes to a
//! `*.tmp` file which is renamed into place only after a successful
//! compile. Leftover `*.tmp` files from interrupted installs are swept at
//! startup.

use anyhow::{bail, Context, Result};
use dict::{compile, Card, Dictionary};
use index::codec::{BeU64, LenBytes, Pair, RawBytes};
use index::Mapping;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use store::{FileStore, OpenMode};

const STATE_FILE: &str = "state.mdict";
const DICT_EXTENSION: &str = "mdict";
const TEMP_EXTENSION: &str = "tmp";

const HISTORY_COUNTS_NAME: &str = "mdict::history::counts";
const HISTORY_RANKED_NAME: &str = "mdict::history::ranked";

/// Longest history key, matching what the ranked mapping's length-prefixed
/// word field can address.
const MAX_HISTORY_WORD_BYTES: usize = u16::MAX as usize;

/// Lookup history counters, persisted in the state store.
///
/// `counts` maps a word to its lookup count; `ranked` mirrors it under an
/// inverted-count key so iteration order is most-frequent-first (ties
/// alphabetical).
pub struct History {
    counts: Mapping<RawBytes, BeU64>,
    ranked: Mapping<Pair<BeU64, LenBytes>, BeU64>,
}

impl History {
    fn open(state: &FileStore) -> Result<Self> {
        Ok(Self {
            counts: Mapping::open(state, HISTORY_COUNTS_NAME)?,
            ranked: Mapping::open(state, HISTORY_RANKED_NAME)?,
        })
    }

    fn save(&self, state: &FileStore) -> Result<()> {
        self.counts.save(state)?;
        self.ranked.save(state)?;
        Ok(())
    }

    /// Bumps the lookup count of `word`. Words beyond the ranked key's
    /// addressable length are counted under their leading bytes.
    pub fn record(&mut self, word: &str) -> Result<()> {
        let bytes = word.as_bytes();
        let key = bytes[..bytes.len().min(MAX_HISTORY_WORD_BYTES)].to_vec();
        let count = self.counts.get(&key)?.unwrap_or(0);
        if count > 0 {
            self.ranked.remove(&(u64::MAX - count, key.clone()));
        }
        let count = count + 1;
        self.counts.set(&key, &count);
        self.ranked.set(&(u64::MAX - count, key), &count);
        Ok(())
    }

    /// Up to `limit` `(word, count)` pairs, most frequent first.
    pub fn top(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let mut out = Vec::new();
        for entry in self.ranked.iter().take(limit) {
            let ((_, word), count) = entry?;
            out.push((String::from_utf8_lossy(&word).into_owned(), count));
        }
        Ok(out)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// The application: every installed dictionary plus the state store.
pub struct App {
    root: PathBuf,
    state: FileStore,
    history: History,
    dicts: Vec<Dictionary>,
}

impl App {
    /// Opens (creating if needed) the data directory at `root`: sweeps
    /// leftover install temp files, opens the state store, and opens every
    /// installed dictionary. A dictionary that fails to open is skipped
    /// with a warning rather than failing startup.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("cannot create data directory {}", root.display()))?;

        let mut dicts = Vec::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            match ext {
                Some(TEMP_EXTENSION) => {
                    // leftover from an interrupted install
                    let _ = fs::remove_file(&path);
                }
                Some(DICT_EXTENSION) if path.file_name().is_some_and(|n| n != STATE_FILE) => {
                    match Dictionary::open(&path) {
                        Ok(dict) => dicts.push(dict),
                        Err(e) => {
                            eprintln!("warning: skipping {}: {}", path.display(), e);
                        }
                    }
                }
                _ => {}
            }
        }
        dicts.sort_by(|a, b| a.name().to_string().cmp(&b.name().to_string()));

        let state = FileStore::open(root.join(STATE_FILE), OpenMode::CreateOrOpen)?;
        let history = History::open(&state)?;

        Ok(Self {
            root: root.to_path_buf(),
            state,
            history,
            dicts,
        })
    }

    /// Data directory from the environment: `MDICT_DATA` if set, else
    /// `$HOME/.local/share/mdict`.
    #[must_use]
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("MDICT_DATA") {
            return PathBuf::from(dir);
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".local/share/mdict")
    }

    #[must_use]
    pub fn dictionaries(&self) -> &[Dictionary] {
        &self.dicts
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Compiles and installs the dictionary source at `source`, returning
    /// the installed dictionary's name.
    ///
    /// The compile target is a temp file in the data directory; it is
    /// renamed to `<name>.mdict` only on success and removed on any
    /// failure, so a broken source never leaves a half-written dictionary
    /// behind.
    pub fn install<F: FnMut(f64)>(&mut self, source: &Path, progress: F) -> Result<String> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp = self
            .root
            .join(format!("install-{}-{}.{}", std::process::id(), nanos, TEMP_EXTENSION));

        let dict = match compile(source, &tmp, progress) {
            Ok(dict) => dict,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e).with_context(|| format!("cannot install {}", source.display()));
            }
        };

        let name = dict.name().to_string();
        let target = self.root.join(format!("{}.{}", sanitize(&name), DICT_EXTENSION));
        if let Err(e) = dict.close() {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        drop(dict);
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        self.dicts.push(Dictionary::open(&target)?);
        self.dicts
            .sort_by(|a, b| a.name().to_string().cmp(&b.name().to_string()));
        Ok(name)
    }

    /// Closes and deletes the dictionary named `name` (or at 1-based
    /// position `name` in the listing).
    pub fn uninstall(&mut self, name: &str) -> Result<()> {
        let position = name
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .filter(|&i| i < self.dicts.len());
        let index = match position {
            Some(i) => i,
            None => match self.dicts.iter().position(|d| d.name() == name) {
                Some(i) => i,
                None => bail!("no such dictionary: {}", name),
            },
        };

        let dict = self.dicts.remove(index);
        let path = dict.path().to_path_buf();
        dict.close()?;
        drop(dict);
        fs::remove_file(&path)
            .with_context(|| format!("cannot remove {}", path.display()))?;
        Ok(())
    }

    /// Looks `word` up in every dictionary, recording a history hit when at
    /// least one matches. Returns `(dictionary name, card)` pairs.
    pub fn lookup(&mut self, word: &str) -> Result<Vec<(String, Card)>> {
        let mut out = Vec::new();
        for dict in &self.dicts {
            if let Some((_, card)) = dict.by_word(word)? {
                out.push((dict.name().to_string(), card));
            }
        }
        if !out.is_empty() {
            self.history.record(word)?;
            self.history.save(&self.state)?;
        }
        Ok(out)
    }

    /// Completions of `prefix` across every installed dictionary.
    #[must_use]
    pub fn complete(&self, prefix: &str, limit: usize) -> Vec<String> {
        dict::complete(self.dicts.iter(), prefix, limit)
    }

    /// Persists history and releases every file handle.
    pub fn close(self) -> Result<()> {
        self.history.save(&self.state)?;
        self.state.close()?;
        for dict in &self.dicts {
            dict.close()?;
        }
        Ok(())
    }
}

/// Dictionary names become file names; anything path-hostile collapses to
/// an underscore.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ' ' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_dsl(dir: &Path, file: &str, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let mut text = format!(
            "#NAME \"{}\"\n#INDEX_LANGUAGE \"English\"\n#CONTENTS_LANGUAGE \"English\"\n",
            name
        );
        for (word, definition) in entries {
            text.push_str(word);
            text.push_str("\n\t[m1]");
            text.push_str(definition);
            text.push_str("[/m]\n");
        }
        let path = dir.join(file);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn install_lookup_uninstall_cycle() -> Result<()> {
        let dir = tempdir()?;
        let src = write_dsl(dir.path(), "pets.dsl", "Pets", &[("cat", "feline"), ("dog", "canine")]);

        let mut app = App::open(dir.path())?;
        let name = app.install(&src, |_| {})?;
        assert_eq!(name, "Pets");
        assert_eq!(app.dictionaries().len(), 1);
        assert!(dir.path().join("Pets.mdict").exists());

        let hits = app.lookup("cat")?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "Pets");

        app.uninstall("Pets")?;
        assert!(app.dictionaries().is_empty());
        assert!(!dir.path().join("Pets.mdict").exists());
        Ok(())
    }

    #[test]
    fn failed_install_leaves_no_files() -> Result<()> {
        let src_dir = tempdir()?;
        let src = src_dir.path().join("words.txt");
        fs::write(&src, "not a dictionary")?;

        let dir = tempdir()?;
        let mut app = App::open(dir.path())?;
        assert!(app.install(&src, |_| {}).is_err());

        let leftovers: Vec<_> = fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .filter(|n| n != STATE_FILE)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
        Ok(())
    }

    #[test]
    fn mid_compile_failure_never_reaches_a_final_path() -> Result<()> {
        let src_dir = tempdir()?;
        // A data/index pair whose second entry points past the end of the
        // data file: the first card compiles, then the stream errors.
        std::fs::write(src_dir.path().join("broken.dict"), b"a feline")?;
        let mut index = Vec::new();
        index.extend_from_slice(b"cat\0");
        index.extend_from_slice(&0u32.to_be_bytes());
        index.extend_from_slice(&8u32.to_be_bytes());
        index.extend_from_slice(b"dog\0");
        index.extend_from_slice(&4096u32.to_be_bytes());
        index.extend_from_slice(&8u32.to_be_bytes());
        std::fs::write(src_dir.path().join("broken.idx"), index)?;

        let dir = tempdir()?;
        let mut app = App::open(dir.path())?;
        assert!(app.install(&src_dir.path().join("broken.dict"), |_| {}).is_err());

        // No dictionary under its final name, no temp artifact left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .filter(|n| n != STATE_FILE)
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
        assert!(app.dictionaries().is_empty());
        Ok(())
    }

    #[test]
    fn startup_sweeps_leftover_temp_files() -> Result<()> {
        let dir = tempdir()?;
        let stale = dir.path().join("install-1-1.tmp");
        fs::write(&stale, b"half-written")?;

        let app = App::open(dir.path())?;
        assert!(!stale.exists());
        drop(app);
        Ok(())
    }

    #[test]
    fn history_orders_by_frequency() -> Result<()> {
        let dir = tempdir()?;
        let src = write_dsl(
            dir.path(),
            "pets.dsl",
            "Pets",
            &[("cat", "feline"), ("dog", "canine")],
        );

        let mut app = App::open(dir.path())?;
        app.install(&src, |_| {})?;
        app.lookup("dog")?;
        app.lookup("cat")?;
        app.lookup("dog")?;
        app.lookup("missing")?; // no hit, no history entry

        let top = app.history().top(10)?;
        assert_eq!(top, vec![("dog".to_string(), 2), ("cat".to_string(), 1)]);
        assert_eq!(app.history().len(), 2);
        assert!(!app.history().is_empty());
        Ok(())
    }

    #[test]
    fn oversized_history_word_is_counted_under_its_prefix() -> Result<()> {
        let dir = tempdir()?;
        let mut app = App::open(dir.path())?;

        let huge = "x".repeat(MAX_HISTORY_WORD_BYTES + 1000);
        app.history.record(&huge)?;
        app.history.record(&huge)?;

        let top = app.history().top(10)?;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0.len(), MAX_HISTORY_WORD_BYTES);
        assert_eq!(top[0].1, 2);
        assert_eq!(app.history().len(), 1);
        Ok(())
    }

    #[test]
    fn history_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        let src = write_dsl(dir.path(), "pets.dsl", "Pets", &[("cat", "feline")]);

        let mut app = App::open(dir.path())?;
        app.install(&src, |_| {})?;
        app.lookup("cat")?;
        app.close()?;

        let app = App::open(dir.path())?;
        assert_eq!(app.history().top(10)?, vec![("cat".to_string(), 1)]);
        assert_eq!(app.dictionaries().len(), 1);
        app.close()?;
        Ok(())
    }

    #[test]
    fn completion_spans_installed_dictionaries() -> Result<()> {
        let dir = tempdir()?;
        let a = write_dsl(dir.path(), "a.dsl", "A", &[("cat", "1"), ("car", "2")]);
        let b = write_dsl(dir.path(), "b.dsl", "B", &[("cab", "3"), ("cat", "4")]);

        let mut app = App::open(dir.path())?;
        app.install(&a, |_| {})?;
        app.install(&b, |_| {})?;

        assert_eq!(app.complete("ca", 10), vec!["cab", "car", "cat", "cat"]);
        Ok(())
    }

    #[test]
    fn unreadable_dictionary_is_skipped_at_startup() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("broken.mdict"), b"garbage bytes")?;
        let src = write_dsl(dir.path(), "pets.dsl", "Pets", &[("cat", "feline")]);

        let mut app = App::open(dir.path())?;
        app.install(&src, |_| {})?;
        drop(app);

        let app = App::open(dir.path())?;
        assert_eq!(app.dictionaries().len(), 1);
        assert_eq!(app.dictionaries()[0].name(), "Pets");
        Ok(())
    }
}
