//! Plain text → markup heuristics.
//!
//! Spreadsheet cells carry structure only as typography: numbered lines,
//! bullet glyphs, shouted or colon-terminated headings, hard-wrapped
//! paragraphs. [`text_to_markup`] recognizes these purely syntactically.
//!
//! This is best-effort. A short all-caps sentence, or a short line in title
//! case, is reported as a heading even when it isn't one; such false
//! positives are the documented price of the heuristic.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::node::{Fragment, MarkupNode};

/// Lines at or above this many characters are never headings.
const HEADING_MAX_CHARS: usize = 100;

/// Title-case lines with more words than this are not headings.
const HEADING_MAX_WORDS: usize = 8;

/// Lines shorter than this continue an open paragraph.
const CONTINUATION_MAX_CHARS: usize = 50;

/// Carriage-return escape that some spreadsheet writers leave in cell text.
const EXCEL_CR_ESCAPE: &str = "_x000D_";

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+(.*)$").expect("valid regex"));

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[•·▪▫◦*-]\s+(.*)$").expect("valid regex"));

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

/// Convert multi-line plain text into a fragment of `h3`, `p`, `ol` and `ul`
/// elements.
#[instrument(skip_all, fields(len = text.len()))]
pub fn text_to_markup(text: &str) -> Fragment {
    let normalized = normalize(text);

    let mut out = Vec::new();
    for group in normalized.split("\n\n") {
        let mut state = State::None;
        for line in group.lines().map(str::trim).filter(|l| !l.is_empty()) {
            state = state.step(classify(line), &mut out);
        }
        state.close(&mut out);
    }

    debug!(blocks = out.len(), "text converted to markup");
    Fragment::new(out)
}

/// Unify line endings and collapse runs of blank lines to one.
fn normalize(text: &str) -> String {
    let unified = text
        .replace(EXCEL_CR_ESCAPE, "")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    let collapsed = BLANK_RUN_RE.replace_all(&unified, "\n\n");
    // Whitespace-only lines separate groups just like empty ones.
    collapsed
        .lines()
        .map(|l| if l.trim().is_empty() { "" } else { l })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    Numbered(&'a str),
    Bulleted(&'a str),
    Heading(&'a str),
    Text(&'a str),
}

/// Classify a trimmed, non-empty line. Numbering beats bullets; headings are
/// only considered for lines that are not list items.
fn classify(line: &str) -> Line<'_> {
    if let Some(caps) = NUMBERED_RE.captures(line) {
        return Line::Numbered(caps.get(1).map_or("", |m| m.as_str()).trim());
    }
    if let Some(caps) = BULLET_RE.captures(line) {
        return Line::Bulleted(caps.get(1).map_or("", |m| m.as_str()).trim());
    }
    if is_heading(line) {
        return Line::Heading(line.trim_end_matches(':').trim_end());
    }
    Line::Text(line)
}

fn is_heading(line: &str) -> bool {
    if line.chars().count() >= HEADING_MAX_CHARS {
        return false;
    }

    let all_caps =
        line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase);
    if all_caps || line.ends_with(':') {
        return true;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    words.len() <= HEADING_MAX_WORDS
        && words
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase))
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// What is open while scanning one paragraph group.
#[derive(Debug)]
enum State {
    None,
    InOrderedList(Vec<String>),
    InUnorderedList(Vec<String>),
    InParagraph(String),
}

impl State {
    /// Feed one classified line, emitting finished blocks into `out`.
    fn step(self, line: Line<'_>, out: &mut Vec<MarkupNode>) -> State {
        match (self, line) {
            (State::InOrderedList(mut items), Line::Numbered(item)) => {
                items.push(item.to_string());
                State::InOrderedList(items)
            }
            (State::InUnorderedList(mut items), Line::Bulleted(item)) => {
                items.push(item.to_string());
                State::InUnorderedList(items)
            }
            (State::InParagraph(mut text), Line::Text(line))
                if line.chars().count() < CONTINUATION_MAX_CHARS =>
            {
                text.push(' ');
                text.push_str(line);
                State::InParagraph(text)
            }
            (state, line) => {
                state.close(out);
                State::open(line, out)
            }
        }
    }

    fn open(line: Line<'_>, out: &mut Vec<MarkupNode>) -> State {
        match line {
            Line::Numbered(item) => State::InOrderedList(vec![item.to_string()]),
            Line::Bulleted(item) => State::InUnorderedList(vec![item.to_string()]),
            Line::Heading(text) => {
                out.push(block("h3", text.to_string()));
                State::None
            }
            Line::Text(text) => State::InParagraph(text.to_string()),
        }
    }

    fn close(self, out: &mut Vec<MarkupNode>) {
        match self {
            State::None => {}
            State::InOrderedList(items) => out.push(list("ol", items)),
            State::InUnorderedList(items) => out.push(list("ul", items)),
            State::InParagraph(text) => out.push(block("p", text)),
        }
    }
}

fn block(tag: &str, text: String) -> MarkupNode {
    MarkupNode::element(tag, vec![MarkupNode::Text(text)])
}

fn list(tag: &str, items: Vec<String>) -> MarkupNode {
    MarkupNode::element(tag, items.into_iter().map(|i| block("li", i)).collect())
}

// ---------------------------------------------------------------------------
// Markup detection
// ---------------------------------------------------------------------------

/// True when `text` starts with an HTML start tag of any name, so it should
/// be parsed and sanitized rather than converted (re-imported exports,
/// pasted HTML). Unknown and denied tags count too; the sanitizer decides
/// what survives.
pub fn looks_like_markup(text: &str) -> bool {
    static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*<[a-zA-Z][\w-]*[\s/>]").expect("valid regex")
    });

    MARKUP_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(node: &MarkupNode) -> Vec<String> {
        node.as_element()
            .unwrap()
            .children
            .iter()
            .map(|li| match &li.as_element().unwrap().children[0] {
                MarkupNode::Text(t) => t.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    fn only_text(node: &MarkupNode) -> &str {
        match &node.as_element().unwrap().children[0] {
            MarkupNode::Text(t) => t,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn numbered_lines_become_ordered_list() {
        let fragment = text_to_markup("1. First\n2. Second");
        assert_eq!(fragment.children.len(), 1);
        assert_eq!(fragment.children[0].tag(), Some("ol"));
        assert_eq!(items(&fragment.children[0]), ["First", "Second"]);
    }

    #[test]
    fn bullet_lines_become_unordered_list() {
        let fragment = text_to_markup("• Alpha\n• Beta");
        assert_eq!(fragment.children.len(), 1);
        assert_eq!(fragment.children[0].tag(), Some("ul"));
        assert_eq!(items(&fragment.children[0]), ["Alpha", "Beta"]);
    }

    #[test]
    fn all_bullet_glyphs_recognized() {
        let fragment = text_to_markup("· a\n▪ b\n▫ c\n◦ d\n- e\n* f");
        assert_eq!(fragment.children.len(), 1);
        assert_eq!(items(&fragment.children[0]), ["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn parenthesized_numbers_and_switching_lists() {
        let fragment = text_to_markup("1) One\n2) Two\n- Dash");
        let tags: Vec<_> = fragment.children.iter().map(|n| n.tag()).collect();
        assert_eq!(tags, [Some("ol"), Some("ul")]);
    }

    #[test]
    fn numbering_takes_precedence_over_headings() {
        // All caps, but still a list item.
        let fragment = text_to_markup("1. MARKET OVERVIEW");
        assert_eq!(fragment.children[0].tag(), Some("ol"));
        assert_eq!(items(&fragment.children[0]), ["MARKET OVERVIEW"]);
    }

    #[test]
    fn headings_detected_three_ways() {
        let fragment = text_to_markup("EXECUTIVE SUMMARY\n\nKey findings:\n\nMarket Dynamics And Trends");
        let tags: Vec<_> = fragment.children.iter().map(|n| n.tag()).collect();
        assert_eq!(tags, [Some("h3"), Some("h3"), Some("h3")]);
        assert_eq!(only_text(&fragment.children[1]), "Key findings");
    }

    #[test]
    fn long_lines_are_never_headings() {
        let line = "A".repeat(HEADING_MAX_CHARS);
        let fragment = text_to_markup(&line);
        assert_eq!(fragment.children[0].tag(), Some("p"));
    }

    #[test]
    fn short_lines_continue_paragraph() {
        let text = "The global widget market grew strongly during the review period\nand is set to\ncontinue growing.";
        let fragment = text_to_markup(text);
        assert_eq!(fragment.children.len(), 1);
        assert_eq!(
            only_text(&fragment.children[0]),
            "The global widget market grew strongly during the review period and is set to continue growing."
        );
    }

    #[test]
    fn long_line_starts_new_paragraph() {
        let text = "short opening line here.\nthis second line is long enough that it will not be merged into the first one.";
        let fragment = text_to_markup(text);
        assert_eq!(fragment.children.len(), 2);
    }

    #[test]
    fn blank_lines_split_groups_and_close_lists() {
        let text = "- one\n- two\n\n\n\n\nthe list above has ended and this is prose text.";
        let fragment = text_to_markup(text);
        let tags: Vec<_> = fragment.children.iter().map(|n| n.tag()).collect();
        assert_eq!(tags, [Some("ul"), Some("p")]);
    }

    #[test]
    fn paragraph_does_not_continue_across_groups() {
        let fragment = text_to_markup("first paragraph of prose text.\n\nnext bit.");
        assert_eq!(fragment.children.len(), 2);
    }

    #[test]
    fn crlf_and_excel_escapes_normalized() {
        let fragment = text_to_markup("- a_x000D_\r\n- b\r\n");
        assert_eq!(items(&fragment.children[0]), ["a", "b"]);
    }

    #[test]
    fn empty_text_yields_empty_fragment() {
        assert!(text_to_markup("").is_empty());
        assert!(text_to_markup(" \n\t\n ").is_empty());
    }

    #[test]
    fn markup_detection() {
        assert!(looks_like_markup("<p>Hello</p>"));
        assert!(looks_like_markup("  <UL><li>x</li></UL>"));
        assert!(looks_like_markup("<br/>"));
        assert!(looks_like_markup("<script>alert(1)</script>"));
        assert!(looks_like_markup("<IMG src=x>"));
        assert!(looks_like_markup("<td>cell</td>"));
        assert!(!looks_like_markup("1 < 2 and <3"));
        assert!(!looks_like_markup("< 5 units"));
        assert!(!looks_like_markup("Intro <p>late tag</p>"));
    }
}
