//! Plain-text card rendering.
//!
//! Walks a card's markup tree and flattens it to indented terminal text.
//! Presentation-only tags (color, sound, folding) contribute nothing of
//! their own; their children are rendered in place.

use dict::{Card, Node, NodeValue};

/// Renders `card` as indented plain text, trailing newline included.
#[must_use]
pub fn card(card: &Card) -> String {
    let mut out = String::new();
    for node in &card.body.children {
        render_node(node, &mut out);
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn render_node(node: &Node, out: &mut String) {
    match node.name.as_str() {
        "text" => {
            if let Some(NodeValue::Text(text)) = &node.value {
                out.push_str(text);
            }
        }
        "indent" => {
            let level = match node.value {
                Some(NodeValue::Number(n)) if n > 0 => n as usize,
                _ => 0,
            };
            out.push_str(&"  ".repeat(level + 1));
            render_children(node, out);
            out.push('\n');
        }
        "transcript" => {
            out.push('[');
            render_children(node, out);
            out.push(']');
        }
        // dropped entirely: playable media and editorial noise
        "sound" | "comment" => {}
        _ => render_children(node, out),
    }
}

fn render_children(node: &Node, out: &mut String) {
    for child in &node.children {
        render_node(child, out);
    }
}
