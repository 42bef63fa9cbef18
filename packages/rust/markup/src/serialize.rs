//! [`Fragment`] → HTML text.
//!
//! Output is deterministic: attributes come out sorted, block elements sit
//! on their own lines, and list/table containers put each child on its own
//! line. Whitespace this layout adds is exactly the whitespace the sanitizer
//! trims, so parsing and re-sanitizing the output yields the same tree.

use crate::node::{Element, Fragment, MarkupNode, is_block, is_container, is_void};

/// Serialize a fragment. Trailing newlines are trimmed.
pub fn to_html(fragment: &Fragment) -> String {
    let mut out = String::new();
    for node in &fragment.children {
        write_node(node, false, &mut out);
    }
    let len = out.trim_end_matches('\n').len();
    out.truncate(len);
    out
}

fn write_node(node: &MarkupNode, in_pre: bool, out: &mut String) {
    match node {
        MarkupNode::Text(text) => escape_text(text, out),
        MarkupNode::Element(el) => write_element(el, in_pre, out),
    }
}

fn write_element(el: &Element, in_pre: bool, out: &mut String) {
    let tag = el.tag.as_str();
    let own_line = !in_pre && is_block(tag) && !matches!(tag, "td" | "th");

    if own_line {
        start_line(out);
    }

    out.push('<');
    out.push_str(tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');

    if is_void(tag) {
        return;
    }

    let child_in_pre = in_pre || tag == "pre";
    if tag == "pre" && starts_with_newline(&el.children) {
        // Parsers drop one newline right after `<pre>`.
        out.push('\n');
    }
    let container = !in_pre && is_container(tag);
    if container {
        out.push('\n');
    }

    for child in &el.children {
        write_node(child, child_in_pre, out);
    }

    if container {
        start_line(out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');

    if own_line {
        out.push('\n');
    }
}

fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn starts_with_newline(children: &[MarkupNode]) -> bool {
    matches!(children.first(), Some(MarkupNode::Text(t)) if t.starts_with('\n'))
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
