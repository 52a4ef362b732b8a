//! Cross-crate pipeline checks: a compiled dictionary file is a plain
//! record store whose indexes open with the standard mapping layer.

use dict::{compile, Dictionary};
use index::codec::{BeU16, BeU32, BeU64, Pair, RawBytes};
use index::Mapping;
use store::{FileStore, OpenMode};

fn write_dsl(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("pets.dsl");
    std::fs::write(
        &path,
        "#NAME \"Pets\"\n#INDEX_LANGUAGE \"English\"\n#CONTENTS_LANGUAGE \"English\"\n\
         cat\n\t[m1]a feline[/m]\n\
         dog\n\t[m1]a canine[/m]\n",
    )
    .unwrap();
    path
}

#[test]
fn compiled_file_is_a_plain_record_store() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_dsl(dir.path());
    let compiled = dir.path().join("pets.mdict");

    let dict = compile(&src, &compiled, |_| {}).unwrap();
    assert_eq!(dict.size(), 2);
    dict.close().unwrap();

    let store = FileStore::open(&compiled, OpenMode::Read).unwrap();
    assert!(store.contains_named("mdict::info").unwrap());
    assert!(store.contains_named("mdict::word_index").unwrap());
    assert!(store.contains_named("mdict::ordinal_index").unwrap());

    let words: Mapping<RawBytes, Pair<BeU64, BeU16>> =
        Mapping::open(&store, "mdict::word_index").unwrap();
    assert_eq!(words.len(), 2);

    let ordinals: Mapping<BeU32, Pair<BeU64, BeU16>> =
        Mapping::open(&store, "mdict::ordinal_index").unwrap();
    assert_eq!(ordinals.len(), 2);
}

#[test]
fn reopened_dictionary_serves_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_dsl(dir.path());
    let compiled = dir.path().join("pets.mdict");

    compile(&src, &compiled, |_| {}).unwrap();

    let dict = Dictionary::open(&compiled).unwrap();
    assert_eq!(dict.name(), "Pets");
    assert!(dict.by_word("cat").unwrap().is_some());
    assert!(dict.by_word("fish").unwrap().is_none());
    assert_eq!(dict::complete([&dict], "c", 10), vec!["cat"]);
}
