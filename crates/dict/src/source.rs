//! Source adapter capability interface.
//!
//! A source adapter turns one on-disk dictionary format into the normalized
//! card stream the compiler consumes. One implementing type per format,
//! selected by file-extension sniffing at the boundary — the compiler never
//! knows which format it is reading.

use crate::card::Card;
use crate::dct::DictSource;
use crate::dsl::DslSource;
use crate::DictError;
use std::path::Path;

/// A parsed dictionary source: metadata plus a stream of cards.
pub trait Source {
    /// Dictionary display name (from source headers, or the file stem).
    fn name(&self) -> String;

    /// `(source, target)` language pair.
    fn language(&self) -> (String, String);

    /// Streams cards to `sink` in source order.
    ///
    /// `progress` receives a monotonic fraction in `[0, 1]` proportional to
    /// the portion of the source consumed. A sink error aborts the stream
    /// and is propagated unchanged.
    fn cards(
        &mut self,
        progress: &mut dyn FnMut(f64),
        sink: &mut dyn FnMut(Card) -> Result<(), DictError>,
    ) -> Result<(), DictError>;
}

/// Picks a source adapter for `path` by extension, or `None` when the
/// format is not recognized.
pub fn detect(path: &Path) -> Result<Option<Box<dyn Source>>, DictError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("dsl") => Ok(Some(Box::new(DslSource::open(path)?))),
        Some("dict") | Some("idx") => Ok(DictSource::open_pair(path)?
            .map(|source| Box::new(source) as Box<dyn Source>)),
        _ => Ok(None),
    }
}
