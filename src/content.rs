//! Content loading and front-matter parsing.
//!
//! Walks the content tree, splits front-matter from markdown bodies and
//! produces one [`Post`] record per document. Posts are constructed fresh on
//! every build pass by re-reading the source file; they are never mutated in
//! place.

use crate::{enrich, markdown};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Root-level pages excluded from listings, pagination, related posts and
/// feeds. Their slugs collide with generated pages or carry no article
/// semantics.
pub const SPECIAL_SLUGS: &[&str] = &["index", "about", "404"];

/// One parsed content document.
///
/// `slug` is the stable join key between the build cache, the tag index and
/// generated URLs (`/{slug}.html`).
#[derive(Debug, Clone)]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub description: String,
    /// Ordered; duplicates are not collapsed
    pub tags: Vec<String>,
    /// Template name selecting a render template
    pub template: String,
    pub draft: bool,
    /// Optional cover image path
    pub image: Option<String>,
    /// Derived reading time in minutes (>= 1)
    pub reading_time: u32,
    /// Derived table-of-contents HTML fragment
    pub toc: String,
    /// Rendered HTML body with heading IDs applied
    pub content: String,
    pub source_path: PathBuf,
}

impl Post {
    /// Site-relative URL for this post.
    pub fn url(&self) -> String {
        format!("/{}.html", self.slug)
    }

    pub fn is_special(&self) -> bool {
        SPECIAL_SLUGS.contains(&self.slug.as_str())
    }

    /// Parse a source file into a complete `Post`, rendering the body and
    /// computing derived fields. Fails only if the file cannot be read.
    pub fn from_source(path: &Path, content_root: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let slug = slug_for(path, content_root);

        let (front, body) = split_front_matter(&raw);
        let meta = front.and_then(parse_front_matter).unwrap_or_default();

        let html = markdown::to_html(body);
        let content = enrich::assign_heading_ids(&html);
        let toc = enrich::table_of_contents(&content);
        let reading_time = enrich::reading_time(body);

        Ok(Self {
            slug,
            title: meta.title.unwrap_or_else(|| "Untitled".into()),
            date: meta.date.unwrap_or_else(Utc::now),
            description: meta.description.unwrap_or_default(),
            tags: meta.tags,
            template: meta.template.unwrap_or_else(|| "post".into()),
            draft: meta.draft,
            image: meta.image,
            reading_time,
            toc,
            content,
            source_path: path.to_path_buf(),
        })
    }
}

/// Derive the slug from a source path: content-relative, extension stripped,
/// separators normalized to `/`.
pub fn slug_for(path: &Path, content_root: &Path) -> String {
    path.strip_prefix(content_root)
        .unwrap_or(path)
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Enumerate all markdown files under the content root, sorted by path for
/// deterministic pass order.
pub fn collect_sources(content_root: &Path) -> Vec<PathBuf> {
    let mut sources: Vec<_> = WalkDir::new(content_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    sources.sort();
    sources
}

/// Load every post under the content root.
pub fn load_posts(content_root: &Path) -> Result<Vec<Post>> {
    collect_sources(content_root)
        .iter()
        .map(|path| Post::from_source(path, content_root))
        .collect()
}

// ============================================================================
// Front Matter
// ============================================================================

#[derive(Debug, Default)]
struct FrontMatter {
    title: Option<String>,
    date: Option<DateTime<Utc>>,
    description: Option<String>,
    tags: Vec<String>,
    template: Option<String>,
    image: Option<String>,
    draft: bool,
}

/// Split an optional `---`-fenced front-matter block from the body.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---") else {
        return (None, raw);
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return (None, raw);
    };

    match rest.find("\n---") {
        Some(end) => {
            let block = &rest[..end];
            // skip the rest of the fence line, then exactly one newline
            let after = rest[end + 4..].trim_start_matches('-');
            let after = after.strip_prefix('\r').unwrap_or(after);
            let body = after.strip_prefix('\n').unwrap_or(after);
            (Some(block), body)
        }
        // Unterminated fence: degrade to "no metadata"
        None => (None, raw),
    }
}

/// Parse `key: value` lines into a front-matter record.
///
/// Returns `None` for a malformed block (a non-blank line without a colon),
/// which degrades the document to "no metadata" rather than aborting.
fn parse_front_matter(block: &str) -> Option<FrontMatter> {
    let mut meta = FrontMatter::default();

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once(':')?;
        let value = unquote(value.trim());

        match key.trim() {
            "title" => meta.title = Some(value.to_owned()),
            "date" => meta.date = parse_date(value),
            "description" => meta.description = Some(value.to_owned()),
            "tags" => meta.tags = parse_tags(value),
            "template" => meta.template = Some(value.to_owned()),
            "image" => meta.image = Some(value.to_owned()),
            "draft" => meta.draft = value.eq_ignore_ascii_case("true"),
            // Unknown keys are ignored
            _ => {}
        }
    }

    Some(meta)
}

/// Strip one matching pair of surrounding quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse a tags value: either an inline sequence `[a, b]` or a comma string.
fn parse_tags(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);

    inner
        .split(',')
        .map(|t| unquote(t.trim()).to_owned())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Parse an ISO-like date string: RFC3339, `YYYY-MM-DD HH:MM:SS`, or
/// `YYYY-MM-DD` (midnight UTC). Anything else yields `None` and the post
/// falls back to the current instant.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
