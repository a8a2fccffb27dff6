//! Derived content generation.
//!
//! Post-processes rendered HTML and raw bodies into the derived artifacts a
//! post carries: reading time, URL-safe heading IDs, the table of contents
//! and the related-posts ranking. All of it is deterministic given identical
//! input.

use crate::content::Post;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::LazyLock;

/// Words-per-minute divisor for the reading time estimate
const WORDS_PER_MINUTE: usize = 200;

/// Maximum number of related posts kept per post
pub const RELATED_LIMIT: usize = 3;

static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h([1-6])>(.*?)</h[1-6]>").unwrap());

static RE_HEADING_WITH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<h([2-4]) id="([^"]+)"[^>]*>(.*?)</h[1-6]>"#).unwrap());

static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

// ============================================================================
// Reading Time
// ============================================================================

/// Estimate reading time in minutes: whitespace-delimited word count divided
/// by 200, rounded up, minimum 1.
pub fn reading_time(body: &str) -> u32 {
    let words = body.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

// ============================================================================
// Heading IDs
// ============================================================================

/// Convert text to a URL-safe identifier: lowercased, non-alphanumeric runs
/// collapsed to single hyphens, trimmed.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    out
}

/// Give every heading element an `id` attribute derived from its text.
///
/// Colliding IDs within one document get `-2`, `-3`, … suffixes in
/// first-seen order.
pub fn assign_heading_ids(html: &str) -> String {
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();

    RE_HEADING
        .replace_all(html, |caps: &regex::Captures| {
            let level = &caps[1];
            let inner = &caps[2];

            let text = RE_TAG.replace_all(inner, "");
            let mut id = slugify(&text);
            if id.is_empty() {
                id = "section".into();
            }

            let count = seen.entry(id.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                id = format!("{id}-{count}");
            }

            format!(r#"<h{level} id="{id}">{inner}</h{level}>"#)
        })
        .into_owned()
}

// ============================================================================
// Table of Contents
// ============================================================================

/// Build a TOC fragment from headings of level 2–4 that carry an id, in
/// document order. Nesting is shown by indentation proportional to
/// `(level - 2)`. Returns an empty string when no qualifying heading exists.
pub fn table_of_contents(html: &str) -> String {
    let mut items = String::new();

    for caps in RE_HEADING_WITH_ID.captures_iter(html) {
        let level: u32 = caps[1].parse().unwrap_or(2);
        let id = &caps[2];
        let text = RE_TAG.replace_all(&caps[3], "");
        let indent = level.saturating_sub(2);

        items.push_str(&format!(
            "<li class=\"toc-item\" style=\"margin-left:{indent}em\"><a href=\"#{id}\">{}</a></li>\n",
            text.trim()
        ));
    }

    if items.is_empty() {
        return String::new();
    }

    format!("<nav class=\"toc\"><ul>\n{items}</ul></nav>")
}

// ============================================================================
// Related Posts
// ============================================================================

/// Rank every other non-draft, non-special post by the number of distinct
/// tags shared with `current`. Strictly positive scores only; stable sort
/// descending (ties keep input order); truncated to [`RELATED_LIMIT`].
pub fn related_posts<'a>(current: &Post, all: &'a [Post]) -> Vec<&'a Post> {
    let own_tags: FxHashSet<&str> = current.tags.iter().map(String::as_str).collect();

    let mut scored: Vec<(usize, &Post)> = all
        .iter()
        .filter(|p| !p.draft && !p.is_special() && p.slug != current.slug)
        .filter_map(|p| {
            let shared: FxHashSet<&str> = p
                .tags
                .iter()
                .map(String::as_str)
                .filter(|t| own_tags.contains(t))
                .collect();
            (!shared.is_empty()).then_some((shared.len(), p))
        })
        .collect();

    // sort_by_key is stable: ties keep input order
    scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
    scored.truncate(RELATED_LIMIT);
    scored.into_iter().map(|(_, p)| p).collect()
}
