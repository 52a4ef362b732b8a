//! DSL (Lingvo-style) source adapter.
//!
//! A DSL file is a UTF-8 text file: a run of `#KEY "VALUE"` header lines,
//! then cards. Each card is one or more non-indented headword lines followed
//! by indented body lines carrying `[tag]...[/tag]` markup. The adapter
//! normalizes headwords (`{...}` spans removed, `(...)` optional parts
//! expanded into every variant) and parses each body into a [`Node`] tree.
//!
//! Close tags in real-world DSL files frequently arrive out of order
//! (`[i][b]x[/i][/b]`). The parser keeps an explicit stack of open nodes and
//! rebalances on a mismatched close: every node above the matching open node
//! is closed implicitly; a close with no matching open node is dropped.

use crate::card::{Card, Node, NodeValue};
use crate::source::Source;
use crate::DictError;
use std::path::Path;

/// DSL tag shorthand to canonical node names.
const TAG_MAP: &[(&str, &str)] = &[
    ("'", "stress"),
    ("*", "fold"),
    ("b", "bold"),
    ("c", "color"),
    ("com", "comment"),
    ("ex", "example"),
    ("i", "italic"),
    ("p", "type"), // part of speech
    ("ref", "link"),
    ("u", "underline"),
    ("s", "sound"),
    ("t", "transcript"),
    ("trn", "translation"),
];

/// Cap on headword variants generated by `(...)` expansion for one line.
const MAX_WORD_VARIANTS: usize = 64;

/// Parsed DSL source file.
pub struct DslSource {
    name: String,
    language: (String, String),
    text: String,
    body_offset: usize,
}

impl DslSource {
    /// Reads and validates `path`, consuming its header lines.
    ///
    /// # Errors
    ///
    /// [`DictError::Compile`] if the file is not UTF-8.
    pub fn open(path: &Path) -> Result<Self, DictError> {
        let raw = std::fs::read(path)?;
        let text = String::from_utf8(raw)
            .map_err(|_| DictError::Compile("DSL source is not UTF-8".into()))?;

        let mut name = None;
        let mut index_language = None;
        let mut contents_language = None;
        let mut body_offset = 0;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_start_matches('\u{feff}').trim();
            if let Some(header) = trimmed.strip_prefix('#') {
                if let Some((key, value)) = parse_header(header) {
                    match key.as_str() {
                        "name" => name = Some(value),
                        "index_language" => index_language = Some(value),
                        "contents_language" => contents_language = Some(value),
                        _ => {}
                    }
                }
                body_offset += line.len();
            } else {
                break;
            }
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dictionary")
            .to_string();

        Ok(Self {
            name: name.unwrap_or(stem),
            language: (
                index_language.unwrap_or_else(|| "any".into()),
                contents_language.unwrap_or_else(|| "any".into()),
            ),
            text,
            body_offset,
        })
    }
}

impl Source for DslSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn language(&self) -> (String, String) {
        self.language.clone()
    }

    fn cards(
        &mut self,
        progress: &mut dyn FnMut(f64),
        sink: &mut dyn FnMut(Card) -> Result<(), DictError>,
    ) -> Result<(), DictError> {
        let total = self.text.len().max(1) as f64;
        let mut offset = self.body_offset;

        let mut head: Vec<&str> = Vec::new();
        let mut body: Vec<&str> = Vec::new();

        for line in self.text[self.body_offset..].split_inclusive('\n') {
            offset += line.len();
            let line = line.trim_end_matches(['\r', '\n']);
            let is_head = line.chars().next().is_some_and(|c| !c.is_whitespace());

            if is_head {
                if !head.is_empty() && !body.is_empty() {
                    emit_card(&head, &body, sink)?;
                    head.clear();
                    body.clear();
                }
                head.push(line);
            } else {
                let line = line.trim();
                if !line.is_empty() && !head.is_empty() {
                    body.push(line);
                }
            }
            progress(offset as f64 / total);
        }
        if !head.is_empty() {
            emit_card(&head, &body, sink)?;
        }
        progress(1.0);
        Ok(())
    }
}

fn emit_card(
    head: &[&str],
    body: &[&str],
    sink: &mut dyn FnMut(Card) -> Result<(), DictError>,
) -> Result<(), DictError> {
    let mut words = Vec::new();
    for line in head {
        words.extend(parse_headword(line));
    }
    if words.is_empty() {
        return Ok(());
    }

    // Lines already carrying an indent tag keep it; bare lines get level 0.
    let mut markup = String::new();
    for line in body {
        if line.starts_with("[m") {
            markup.push_str(line);
        } else {
            markup.push_str("[m0]");
            markup.push_str(line);
            markup.push_str("[/m]");
        }
    }

    sink(Card::new(words, parse_markup(&markup)))
}

/// `KEY "VALUE"` after the leading `#`.
fn parse_header(header: &str) -> Option<(String, String)> {
    let key_end = header.find(char::is_whitespace).unwrap_or(header.len());
    let key = header[..key_end].to_ascii_lowercase();
    let rest = &header[key_end..];
    let open = rest.find('"')?;
    let close = rest[open + 1..].find('"')? + open + 1;
    Some((key, rest[open + 1..close].to_string()))
}

/// Normalizes one headword line into its variants: `{...}` spans dropped,
/// whitespace runs collapsed, `(...)` optional parts expanded.
fn parse_headword(line: &str) -> Vec<String> {
    let mut cleaned = String::new();
    let mut depth = 0usize;
    for ch in line.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(ch),
            _ => {}
        }
    }
    expand_alternatives(&cleaned)
}

fn expand_alternatives(word: &str) -> Vec<String> {
    if let Some(open) = word.find('(') {
        if let Some(close) = word[open..].find(')').map(|rel| open + rel) {
            let without = format!("{}{}", &word[..open], &word[close + 1..]);
            let with = format!("{}{}{}", &word[..open], &word[open + 1..close], &word[close + 1..]);
            let mut out = expand_alternatives(&without);
            out.extend(expand_alternatives(&with));
            out.truncate(MAX_WORD_VARIANTS);
            return out;
        }
    }
    let collapsed = collapse_spaces(word);
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out
}

/// Parses `[tag]...[/tag]` markup into a node tree rooted at `"root"`.
fn parse_markup(body: &str) -> Node {
    let mut stack: Vec<Node> = vec![Node::tag("root")];
    let bytes = body.as_bytes();
    let mut i = 0;
    let mut text_start = 0;

    while i < bytes.len() {
        if bytes[i] == b'[' && (i == 0 || bytes[i - 1] != b'\\') {
            if let Some(end) = body[i..].find(']').map(|rel| i + rel) {
                if text_start < i {
                    push_text(&mut stack, &body[text_start..i]);
                }
                apply_tag(&mut stack, &body[i + 1..end]);
                i = end + 1;
                text_start = i;
                continue;
            }
        }
        i += 1;
    }
    if text_start < bytes.len() {
        push_text(&mut stack, &body[text_start..]);
    }

    // Close anything left open.
    while stack.len() > 1 {
        let node = stack.pop().expect("stack is non-empty");
        stack.last_mut().expect("root remains").children.push(node);
    }
    stack.pop().expect("root remains")
}

fn push_text(stack: &mut Vec<Node>, raw: &str) {
    let mut text = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                text.push(escaped);
                continue;
            }
        }
        text.push(ch);
    }
    stack
        .last_mut()
        .expect("stack is non-empty")
        .children
        .push(Node::text(&text));
}

fn apply_tag(stack: &mut Vec<Node>, inside: &str) {
    let (close, inside) = match inside.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inside),
    };
    let (raw_name, raw_value) = match inside.find(char::is_whitespace) {
        Some(pos) => (&inside[..pos], Some(inside[pos..].trim())),
        None => (inside, None),
    };
    let (name, value) = map_tag(raw_name, raw_value);

    if close {
        close_tag(stack, &name);
    } else {
        let node = match value {
            Some(v) => Node::with_value(&name, v),
            None => Node::tag(&name),
        };
        stack.push(node);
    }
}

fn map_tag(raw: &str, raw_value: Option<&str>) -> (String, Option<NodeValue>) {
    // `[m]`, `[m0]`..`[m9]` are indent tags with a numeric level.
    if let Some(rest) = raw.strip_prefix('m') {
        if rest.is_empty() {
            return ("indent".into(), Some(NodeValue::Number(0)));
        }
        if let Ok(level) = rest.parse::<i64>() {
            return ("indent".into(), Some(NodeValue::Number(level)));
        }
    }

    let name = TAG_MAP
        .iter()
        .find(|(short, _)| *short == raw)
        .map_or(raw, |(_, full)| full);
    let value = raw_value
        .filter(|v| !v.is_empty())
        .map(|v| NodeValue::Text(v.to_string()));
    (name.to_string(), value)
}

/// Closes the deepest open node named `name`, implicitly closing everything
/// opened after it. A close with no matching open node is dropped.
fn close_tag(stack: &mut Vec<Node>, name: &str) {
    let Some(pos) = stack.iter().rposition(|n| n.name == name) else {
        return;
    };
    if pos == 0 {
        return; // never close the root
    }
    while stack.len() > pos {
        let node = stack.pop().expect("stack is non-empty");
        stack.last_mut().expect("root remains").children.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(node: &Node) -> &str {
        match &node.value {
            Some(NodeValue::Text(t)) => t,
            other => panic!("expected text value, got {:?}", other),
        }
    }

    #[test]
    fn headword_braces_are_dropped() {
        assert_eq!(parse_headword("to {be} run"), vec!["to run".to_string()]);
    }

    #[test]
    fn headword_alternatives_expand() {
        let mut words = parse_headword("colo(u)r");
        words.sort();
        assert_eq!(words, vec!["color".to_string(), "colour".to_string()]);
    }

    #[test]
    fn headword_two_groups_expand_to_four() {
        assert_eq!(parse_headword("a(b)c(d)").len(), 4);
    }

    #[test]
    fn markup_nests_and_unescapes() {
        let root = parse_markup(r"[m1]plain [b]bold \[x\][/b][/m]");
        assert_eq!(root.children.len(), 1);
        let indent = &root.children[0];
        assert_eq!(indent.name, "indent");
        assert_eq!(indent.value, Some(NodeValue::Number(1)));
        assert_eq!(text_of(&indent.children[0]), "plain ");
        let bold = &indent.children[1];
        assert_eq!(bold.name, "bold");
        assert_eq!(text_of(&bold.children[0]), "bold [x]");
    }

    #[test]
    fn mismatched_close_rebalances() {
        // [i][b]x[/i] — the close of "italic" implicitly closes "bold".
        let root = parse_markup("[m0][i][b]x[/i][/b][/m]");
        let indent = &root.children[0];
        let italic = &indent.children[0];
        assert_eq!(italic.name, "italic");
        let bold = &italic.children[0];
        assert_eq!(bold.name, "bold");
        assert_eq!(text_of(&bold.children[0]), "x");
    }

    #[test]
    fn stray_close_is_dropped() {
        let root = parse_markup("[m0]text[/b][/m]");
        let indent = &root.children[0];
        assert_eq!(indent.children.len(), 1);
        assert_eq!(text_of(&indent.children[0]), "text");
    }

    #[test]
    fn tag_shorthands_map_to_names() {
        let root = parse_markup("[m0][trn]word[/trn][/m]");
        assert_eq!(root.children[0].children[0].name, "translation");
    }

    #[test]
    fn tag_value_is_kept() {
        let root = parse_markup("[m0][c red]x[/c][/m]");
        let color = &root.children[0].children[0];
        assert_eq!(color.name, "color");
        assert_eq!(color.value, Some(NodeValue::Text("red".into())));
    }

    #[test]
    fn full_source_streams_cards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mini.dsl");
        std::fs::write(
            &path,
            "#NAME \"Mini\"\n#INDEX_LANGUAGE \"English\"\n#CONTENTS_LANGUAGE \"Russian\"\n\
             cat\n\t[m1]a small animal[/m]\n\
             dog\nhound\n\t[m1]a loyal animal[/m]\n",
        )
        .unwrap();

        let mut source = DslSource::open(&path).unwrap();
        assert_eq!(source.name(), "Mini");
        assert_eq!(source.language(), ("English".into(), "Russian".into()));

        let mut cards = Vec::new();
        let mut last = 0.0f64;
        source
            .cards(
                &mut |v| {
                    assert!(v >= last, "progress must be monotonic");
                    last = v;
                },
                &mut |card| {
                    cards.push(card);
                    Ok(())
                },
            )
            .unwrap();

        assert!((last - 1.0).abs() < f64::EPSILON);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].words, vec!["cat"]);
        assert_eq!(cards[1].words, vec!["dog", "hound"]);
    }

    #[test]
    fn name_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webster.dsl");
        std::fs::write(&path, "word\n\tdefinition\n").unwrap();

        let source = DslSource::open(&path).unwrap();
        assert_eq!(source.name(), "webster");
    }
}
