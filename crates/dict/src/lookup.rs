//! Exact, alphabetic and positional lookups over a compiled dictionary.
//!
//! Alphabetic ranges go through the ordinal indirection: a word bound is
//! first resolved to the ordinal of the smallest indexed word at or after
//! it, then both bounds address the dense ordinal index. The resulting
//! [`CardRange`] is a half-open window `[start, stop)` whose length is known
//! without touching a single card.

use crate::card::Card;
use crate::{DictError, Dictionary};

impl Dictionary {
    /// Exact headword lookup.
    ///
    /// Returns the matched headword (the variant stored at the index
    /// position) together with its full card, or `None` when the dictionary
    /// has no such headword. An absent word is not an error.
    pub fn by_word(&self, word: &str) -> Result<Option<(String, Card)>, DictError> {
        match self.word_index().get(&word.as_bytes().to_vec())? {
            Some((desc, pos)) => {
                let card = self.load_card(desc)?;
                let matched = card.words.get(pos as usize).cloned().ok_or_else(|| {
                    DictError::Decode(format!(
                        "card word position {} out of range ({} words)",
                        pos,
                        card.words.len()
                    ))
                })?;
                Ok(Some((matched, card)))
            }
            None => Ok(None),
        }
    }

    /// Ordinal of the smallest indexed word `>= word`, or `None` when every
    /// indexed word sorts before it.
    pub fn resolve_ordinal(&self, word: &str) -> Result<Option<u32>, DictError> {
        let key = word.as_bytes().to_vec();
        match self.word_index().range(Some(&key), None).next() {
            Some(entry) => {
                let (_, (desc, pos)) = entry?;
                let card = self.load_card(desc)?;
                let ordinal = card.numbers.get(pos as usize).copied().ok_or_else(|| {
                    DictError::Decode(format!(
                        "card ordinal position {} out of range ({} assigned)",
                        pos,
                        card.numbers.len()
                    ))
                })?;
                Ok(Some(ordinal))
            }
            None => Ok(None),
        }
    }

    /// Alphabetic window `[start, stop)`.
    ///
    /// A `None` bound means "from the first word" / "to the last word". A
    /// bound past every indexed word resolves to the end of the dictionary,
    /// so `by_word_range(Some("zzz"), None)` is empty rather than an error.
    pub fn by_word_range(
        &self,
        start: Option<&str>,
        stop: Option<&str>,
    ) -> Result<CardRange<'_>, DictError> {
        let start = match start {
            Some(word) => self.resolve_ordinal(word)?.unwrap_or(self.size()),
            None => 0,
        };
        let stop = match stop {
            Some(word) => self.resolve_ordinal(word)?.unwrap_or(self.size()),
            None => self.size(),
        };
        Ok(self.by_ordinal_range(Some(start), Some(stop)))
    }

    /// Positional window `[start, stop)`, clamped to the dictionary size.
    #[must_use]
    pub fn by_ordinal_range(&self, start: Option<u32>, stop: Option<u32>) -> CardRange<'_> {
        let start = start.unwrap_or(0).min(self.size());
        let stop = stop.unwrap_or(self.size()).min(self.size());
        CardRange {
            dict: self,
            start,
            stop,
        }
    }
}

/// Half-open window `[start, stop)` of a dictionary in alphabetic order.
///
/// Cheap to construct and to measure; cards are only loaded when iterated.
/// [`iter`](CardRange::iter) is restartable.
#[derive(Debug, Clone, Copy)]
pub struct CardRange<'a> {
    dict: &'a Dictionary,
    start: u32,
    stop: u32,
}

impl<'a> CardRange<'a> {
    /// Number of words in the window.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.stop.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    /// First ordinal of the window.
    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// One past the last ordinal of the window.
    #[must_use]
    pub fn stop(&self) -> u32 {
        self.stop
    }

    /// Streams `(word, card)` pairs in alphabetic order.
    ///
    /// Each yielded word is the specific headword the ordinal was assigned
    /// to; a card with several headwords in the window appears once per
    /// headword.
    pub fn iter(&self) -> impl Iterator<Item = Result<(String, Card), DictError>> + 'a {
        let dict = self.dict;
        dict.ordinal_index()
            .range(Some(&self.start), Some(&self.stop))
            .map(move |entry| {
                let (_, (desc, pos)) = entry?;
                let card = dict.load_card(desc)?;
                let word = card.words.get(pos as usize).cloned().ok_or_else(|| {
                    DictError::Decode(format!(
                        "card word position {} out of range ({} words)",
                        pos,
                        card.words.len()
                    ))
                })?;
                Ok((word, card))
            })
    }
}
