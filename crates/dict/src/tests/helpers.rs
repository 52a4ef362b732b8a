use crate::card::{Card, Node};
use crate::source::Source;
use crate::{compile_source, DictError, Dictionary};
use std::path::Path;

/// In-memory source: one `(headwords, definition)` pair per card.
pub struct MemorySource {
    name: String,
    cards: Vec<Card>,
}

impl MemorySource {
    pub fn new(name: &str, entries: &[(&[&str], &str)]) -> Self {
        let cards = entries
            .iter()
            .map(|(words, text)| {
                let words = words.iter().map(|w| w.to_string()).collect();
                let mut body = Node::tag("root");
                body.children.push(Node::text(text));
                Card::new(words, body)
            })
            .collect();
        Self {
            name: name.to_string(),
            cards,
        }
    }
}

impl Source for MemorySource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn language(&self) -> (String, String) {
        ("English".to_string(), "English".to_string())
    }

    fn cards(
        &mut self,
        progress: &mut dyn FnMut(f64),
        sink: &mut dyn FnMut(Card) -> Result<(), DictError>,
    ) -> Result<(), DictError> {
        let total = self.cards.len().max(1) as f64;
        let cards = std::mem::take(&mut self.cards);
        for (done, card) in cards.into_iter().enumerate() {
            sink(card)?;
            progress((done + 1) as f64 / total);
        }
        Ok(())
    }
}

/// Compiles `entries` into `dir/file` and opens the result.
pub fn compile_memory(
    dir: &Path,
    file: &str,
    name: &str,
    entries: &[(&[&str], &str)],
) -> Dictionary {
    let mut source = MemorySource::new(name, entries);
    compile_source(&mut source, &dir.join(file), |_| {}).expect("compilation failed")
}

/// Definition text of the first text node under the card body.
pub fn definition(card: &Card) -> String {
    use crate::card::NodeValue;
    match &card.body.children[0].value {
        Some(NodeValue::Text(t)) => t.clone(),
        other => panic!("expected text node, got {:?}", other),
    }
}
