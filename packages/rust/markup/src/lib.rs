//! Rich-text handling for long-form report fields.
//!
//! Cells reach us either as plain multi-line text or as HTML pasted from
//! another system. Both end up as sanitized markup:
//!
//! - [`text_to_markup`] turns plain text into headings, paragraphs and lists
//! - [`parse_html`] reads existing markup into the same [`Fragment`] tree
//! - [`sanitize`] applies the allow-list policy and serializes the result
//!
//! [`render_rich_text`] picks the right path for a raw cell value.

mod convert;
mod node;
mod parse;
mod sanitize;
mod serialize;

pub use convert::{looks_like_markup, text_to_markup};
pub use node::{Element, Fragment, MarkupNode};
pub use parse::parse_html;
pub use sanitize::{MAX_DEPTH, Sanitized, sanitize, sanitize_html};
pub use serialize::to_html;

/// Produce sanitized markup for a rich-text cell.
///
/// Values that start with a tag are parsed as HTML; anything else goes
/// through the plain-text converter first.
pub fn render_rich_text(raw: &str) -> Sanitized {
    if looks_like_markup(raw) {
        sanitize_html(raw)
    } else {
        sanitize(text_to_markup(raw))
    }
}
