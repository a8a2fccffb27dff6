//! Markdown rendering boundary.
//!
//! Conversion is treated as a pure function `markdown → HTML`; everything
//! downstream (heading IDs, TOC) works on the produced HTML string.

use pulldown_cmark::{html, Options, Parser};

/// Render a markdown body to an HTML fragment.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
