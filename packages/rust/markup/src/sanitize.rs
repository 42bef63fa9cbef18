//! Allow-list markup sanitizer.
//!
//! [`sanitize`] is a pure bottom-up transform over a [`Fragment`]:
//!
//! 1. elements on the deny-list are removed with their whole subtree
//! 2. remaining elements outside the allow-list are rewritten through a fixed
//!    substitution table, or to a generic `div`/`span` that keeps children
//! 3. attributes are filtered per tag; URLs must use a safe scheme
//! 4. the result is tidied: adjacent text merged, insignificant whitespace
//!    dropped, empty elements removed, `<br>` runs capped
//!
//! Sanitizing a sanitized fragment returns it unchanged.

use std::collections::BTreeMap;

use tracing::{debug, instrument, warn};
use url::Url;

use crate::node::{Element, Fragment, MarkupNode, is_block, is_html_space, is_void};
use crate::parse::parse_checked;
use crate::serialize::to_html;

/// Deepest element nesting accepted before degrading to plain text.
pub const MAX_DEPTH: usize = 256;

/// Longest run of consecutive `<br>` kept.
const MAX_BR_RUN: usize = 3;

/// Removed together with everything inside them.
const DENIED_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "input", "button", "link", "meta",
    "base", "title",
];

const ALLOWED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "strong", "em", "br", "div",
    "span", "a", "table", "thead", "tbody", "tr", "td", "th", "blockquote", "code", "pre", "img",
];

/// Unknown tags that conventionally render as blocks; they become `div`.
/// Every other unknown tag becomes `span`.
const BLOCK_FALLBACK_TAGS: &[&str] = &[
    "address", "article", "aside", "body", "caption", "dd", "details", "dialog", "dir", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "header", "hgroup", "hr", "html", "legend",
    "listing", "main", "menu", "nav", "noscript", "section", "summary", "tfoot", "xmp",
];

const UNDERLINE: &str = "text-decoration: underline";
const CENTERED: &str = "text-align: center";
const LARGER: &str = "font-size: larger";
const SMALLER: &str = "font-size: smaller";

/// The only `style` values that survive, i.e. those the substitutions emit.
const ALLOWED_STYLES: &[&str] = &[UNDERLINE, CENTERED, LARGER, SMALLER];

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A sanitized fragment and its serialized markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub fragment: Fragment,
    pub html: String,
    /// Set when the input had an unexpected shape and was reduced to text.
    pub anomaly: Option<String>,
}

/// Sanitize a markup tree.
#[instrument(skip_all)]
pub fn sanitize(fragment: Fragment) -> Sanitized {
    let depth = fragment.depth();
    if depth > MAX_DEPTH {
        let anomaly = format!("markup nested {depth} levels deep (limit {MAX_DEPTH})");
        warn!(depth, "sanitization anomaly, reducing markup to text");
        return strip_to_text(&fragment, anomaly);
    }

    let children = fragment
        .children
        .into_iter()
        .filter_map(|n| sanitize_node(n, false))
        .collect();
    let fragment = Fragment::new(tidy(children, None, false));
    let html = to_html(&fragment);

    debug!(len = html.len(), "markup sanitized");
    Sanitized {
        fragment,
        html,
        anomaly: None,
    }
}

/// Parse and sanitize markup text.
pub fn sanitize_html(html: &str) -> Sanitized {
    let (fragment, flattened) = parse_checked(html);
    let mut sanitized = sanitize(fragment);
    if flattened && sanitized.anomaly.is_none() {
        sanitized.anomaly = Some(format!(
            "markup nested deeper than {MAX_DEPTH} levels was flattened to text"
        ));
    }
    sanitized
}

/// Degrade to a single paragraph of the fragment's visible text.
fn strip_to_text(fragment: &Fragment, anomaly: String) -> Sanitized {
    let text = fragment.text_content(|el| is_denied(&el.tag));
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let fragment = if text.is_empty() {
        Fragment::default()
    } else {
        Fragment::new(vec![MarkupNode::element("p", vec![MarkupNode::Text(text)])])
    };
    let html = to_html(&fragment);

    Sanitized {
        fragment,
        html,
        anomaly: Some(anomaly),
    }
}

// ---------------------------------------------------------------------------
// Node transform
// ---------------------------------------------------------------------------

fn sanitize_node(node: MarkupNode, in_pre: bool) -> Option<MarkupNode> {
    let el = match node {
        MarkupNode::Text(text) => return Some(MarkupNode::Text(text)),
        MarkupNode::Element(el) => el,
    };

    let name = el.tag.to_ascii_lowercase();
    if is_denied(&name) {
        return None;
    }

    let (tag, style) = rewrite_tag(&name);
    let in_pre = in_pre || tag == "pre";

    // Children first, so parents see final descendants.
    let children = if is_void(tag) {
        Vec::new()
    } else {
        let sanitized = el
            .children
            .into_iter()
            .filter_map(|c| sanitize_node(c, in_pre))
            .collect();
        tidy(sanitized, Some(tag), in_pre)
    };

    let attrs = el
        .attrs
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    let mut attrs = filter_attrs(tag, attrs);
    if let Some(style) = style {
        attrs.insert("style".to_string(), style.to_string());
    }

    Some(MarkupNode::Element(Element {
        tag: tag.to_string(),
        attrs,
        children,
    }))
}

fn is_denied(tag: &str) -> bool {
    DENIED_TAGS.contains(&tag)
}

/// Map a tag to an allowed one, with an optional style it implies.
fn rewrite_tag(tag: &str) -> (&'static str, Option<&'static str>) {
    if let Some(allowed) = ALLOWED_TAGS.iter().find(|t| **t == tag) {
        return (*allowed, None);
    }

    match tag {
        "b" => ("strong", None),
        "i" => ("em", None),
        "u" => ("span", Some(UNDERLINE)),
        "center" => ("div", Some(CENTERED)),
        "font" => ("span", None),
        "big" => ("span", Some(LARGER)),
        "small" => ("span", Some(SMALLER)),
        other if BLOCK_FALLBACK_TAGS.contains(&other) => ("div", None),
        _ => ("span", None),
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

fn allowed_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "title"],
        "img" => &["src", "alt", "title"],
        "table" => &["border", "cellpadding", "cellspacing"],
        "td" | "th" => &["colspan", "rowspan"],
        "span" | "div" => &["style"],
        _ => &[],
    }
}

fn filter_attrs(tag: &str, attrs: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let allowed = allowed_attrs(tag);
    attrs
        .into_iter()
        .filter(|(name, value)| allowed.contains(&name.as_str()) && is_safe_value(name, value))
        .collect()
}

fn is_safe_value(name: &str, value: &str) -> bool {
    match name {
        "href" | "src" => is_safe_url(value),
        "style" => ALLOWED_STYLES.contains(&value.trim()),
        "colspan" | "rowspan" | "border" | "cellpadding" | "cellspacing" => {
            !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
        }
        _ => true,
    }
}

/// Fragments, scheme-less references and the safe schemes pass; anything
/// else (`javascript:`, `data:`, `vbscript:` ...) is rejected.
fn is_safe_url(value: &str) -> bool {
    let value = value.trim();
    if value.starts_with('#') {
        return true;
    }
    match Url::parse(value) {
        Ok(url) => SAFE_SCHEMES.contains(&url.scheme()),
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Tidy
// ---------------------------------------------------------------------------

/// Normalize one sibling list. `parent` is `None` for the root, which
/// behaves like a block.
fn tidy(children: Vec<MarkupNode>, parent: Option<&str>, in_pre: bool) -> Vec<MarkupNode> {
    let children = children
        .into_iter()
        .filter(|n| !is_empty_element(n, in_pre))
        .collect();
    let children = merge_text(cap_line_breaks(children));
    if in_pre {
        children
    } else {
        trim_block_whitespace(children, parent.is_none_or(is_block))
    }
}

/// Elements with no text and no element children, except voids and cells.
fn is_empty_element(node: &MarkupNode, in_pre: bool) -> bool {
    let Some(el) = node.as_element() else {
        return false;
    };
    if is_void(&el.tag) || matches!(el.tag.as_str(), "td" | "th") {
        return false;
    }
    let keep_space = in_pre || el.tag == "pre";
    el.children.iter().all(|c| match c {
        MarkupNode::Text(t) => !keep_space && t.chars().all(is_html_space),
        MarkupNode::Element(_) => false,
    })
}

fn merge_text(children: Vec<MarkupNode>) -> Vec<MarkupNode> {
    let mut out: Vec<MarkupNode> = Vec::with_capacity(children.len());
    for node in children {
        if let (Some(MarkupNode::Text(prev)), MarkupNode::Text(next)) = (out.last_mut(), &node) {
            prev.push_str(next);
            continue;
        }
        out.push(node);
    }
    out
}

/// Trim text next to block siblings, and at the edges of block parents.
fn trim_block_whitespace(children: Vec<MarkupNode>, parent_is_block: bool) -> Vec<MarkupNode> {
    let len = children.len();
    let block_at: Vec<bool> = children.iter().map(MarkupNode::is_block_element).collect();

    children
        .into_iter()
        .enumerate()
        .filter_map(|(i, node)| {
            let MarkupNode::Text(text) = node else {
                return Some(node);
            };
            let after_block = if i == 0 { parent_is_block } else { block_at[i - 1] };
            let before_block = if i + 1 == len {
                parent_is_block
            } else {
                block_at[i + 1]
            };

            let mut slice = text.as_str();
            if after_block {
                slice = slice.trim_start_matches(is_html_space);
            }
            if before_block {
                slice = slice.trim_end_matches(is_html_space);
            }

            if slice.is_empty() {
                None
            } else if slice.len() == text.len() {
                Some(MarkupNode::Text(text))
            } else {
                Some(MarkupNode::Text(slice.to_string()))
            }
        })
        .collect()
}

/// Drop `<br>` beyond the third in a run; whitespace between breaks does not
/// end the run.
fn cap_line_breaks(children: Vec<MarkupNode>) -> Vec<MarkupNode> {
    let mut run = 0;
    children
        .into_iter()
        .filter(|node| match node {
            MarkupNode::Element(el) if el.tag == "br" => {
                run += 1;
                run <= MAX_BR_RUN
            }
            MarkupNode::Text(t) if t.chars().all(is_html_space) => true,
            _ => {
                run = 0;
                true
            }
        })
        .collect()
}
