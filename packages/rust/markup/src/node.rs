//! The markup tree shared by the converter, the parser and the sanitizer.

use std::collections::BTreeMap;

use serde::Serialize;

/// A node in a markup tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupNode {
    Text(String),
    Element(Element),
}

/// An element with lower-case tag name, attributes and ordered children.
///
/// Attributes are kept sorted so serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<MarkupNode>,
}

/// The synthetic root container of a markup tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn element(tag: impl Into<String>, children: Vec<MarkupNode>) -> Self {
        Self::Element(Element::new(tag).with_children(children))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    /// Tag name, `None` for text.
    pub fn tag(&self) -> Option<&str> {
        self.as_element().map(|el| el.tag.as_str())
    }

    pub(crate) fn is_block_element(&self) -> bool {
        self.tag().is_some_and(is_block)
    }
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<MarkupNode>) -> Self {
        self.children = children;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

impl Fragment {
    pub fn new(children: Vec<MarkupNode>) -> Self {
        Self { children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Deepest element nesting level (an element directly under the root is 1).
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(&MarkupNode, usize)> =
            self.children.iter().map(|n| (n, 1)).collect();
        while let Some((node, level)) = stack.pop() {
            if let MarkupNode::Element(el) = node {
                max = max.max(level);
                stack.extend(el.children.iter().map(|c| (c, level + 1)));
            }
        }
        max
    }

    /// Concatenated text, visiting nodes in document order.
    ///
    /// Subtrees for which `skip` returns true contribute nothing. Block
    /// elements are separated by a space.
    pub fn text_content(&self, skip: impl Fn(&Element) -> bool) -> String {
        let mut out = String::new();
        let mut stack: Vec<&MarkupNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                MarkupNode::Text(text) => out.push_str(text),
                MarkupNode::Element(el) if skip(el) => {}
                MarkupNode::Element(el) => {
                    if is_block(&el.tag) {
                        out.push(' ');
                    }
                    stack.extend(el.children.iter().rev());
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tag classes
// ---------------------------------------------------------------------------

/// Elements that break the inline flow. Whitespace next to them is
/// insignificant.
pub(crate) fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "li"
            | "div"
            | "table"
            | "thead"
            | "tbody"
            | "tr"
            | "td"
            | "th"
            | "blockquote"
            | "pre"
    )
}

/// Elements that never have children.
pub(crate) fn is_void(tag: &str) -> bool {
    matches!(tag, "br" | "img")
}

/// Elements whose children go on their own lines when serialized.
pub(crate) fn is_container(tag: &str) -> bool {
    matches!(tag, "ul" | "ol" | "table" | "thead" | "tbody" | "blockquote")
}

/// HTML's definition of whitespace (narrower than Unicode's; keeps `&nbsp;`).
pub(crate) fn is_html_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0C')
}
