//! HTML text → [`Fragment`], via `scraper`'s html5ever fragment parser.

use scraper::{ElementRef, Html};
use tracing::warn;

use crate::node::{Element, Fragment, MarkupNode};
use crate::sanitize::MAX_DEPTH;

/// Parse `html` as a body fragment.
///
/// Comments, doctypes and processing instructions are dropped. Subtrees
/// nested deeper than the sanitizer accepts are flattened to their text.
pub fn parse_html(html: &str) -> Fragment {
    parse_checked(html).0
}

/// Like [`parse_html`], also reporting whether any subtree was flattened.
pub(crate) fn parse_checked(html: &str) -> (Fragment, bool) {
    let doc = Html::parse_fragment(html);
    let mut flattened = false;
    let children = convert_children(doc.root_element(), 1, &mut flattened);

    if flattened {
        warn!(max_depth = MAX_DEPTH, "markup nested too deeply, flattened to text");
    }

    (Fragment::new(children), flattened)
}

fn convert_children(parent: ElementRef<'_>, depth: usize, flattened: &mut bool) -> Vec<MarkupNode> {
    parent
        .children()
        .filter_map(|child| {
            if let Some(el) = ElementRef::wrap(child) {
                return Some(convert_element(el, depth, flattened));
            }
            child.value().as_text().map(|t| MarkupNode::text(t.to_string()))
        })
        .collect()
}

fn convert_element(el: ElementRef<'_>, depth: usize, flattened: &mut bool) -> MarkupNode {
    if depth > MAX_DEPTH {
        *flattened = true;
        return MarkupNode::text(el.text().collect::<String>());
    }

    let value = el.value();
    let attrs = value
        .attrs()
        .map(|(name, v)| (name.to_ascii_lowercase(), v.to_string()))
        .collect();

    MarkupNode::Element(Element {
        tag: value.name().to_ascii_lowercase(),
        attrs,
        children: convert_children(el, depth + 1, flattened),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elements_text_and_attributes() {
        let fragment = parse_html(r#"<p class="lead">Hi <a href="/x" TITLE="t">there</a></p>"#);
        assert_eq!(fragment.children.len(), 1);

        let p = fragment.children[0].as_element().unwrap();
        assert_eq!(p.tag, "p");
        assert_eq!(p.attr("class"), Some("lead"));
        assert_eq!(p.children[0], MarkupNode::text("Hi "));

        let a = p.children[1].as_element().unwrap();
        assert_eq!(a.attr("href"), Some("/x"));
        assert_eq!(a.attr("title"), Some("t"));
    }

    #[test]
    fn decodes_entities_and_drops_comments() {
        let fragment = parse_html("<p>R&amp;D <!-- note --></p>");
        let p = fragment.children[0].as_element().unwrap();
        assert_eq!(p.children, vec![MarkupNode::text("R&D ")]);
    }

    #[test]
    fn plain_text_becomes_a_text_node() {
        let fragment = parse_html("just words");
        assert_eq!(fragment.children, vec![MarkupNode::text("just words")]);
    }

    #[test]
    fn flattens_excessive_nesting() {
        let depth = MAX_DEPTH + 10;
        let html = format!("{}deep{}", "<span>".repeat(depth), "</span>".repeat(depth));
        let (fragment, flattened) = parse_checked(&html);
        assert!(flattened);
        assert!(fragment.depth() <= MAX_DEPTH);
    }
}
