//! Aggregate page data: tag index, pagination and pre-rendered fragments.
//!
//! Aggregates are recomputed in full on every pass. Their output depends on
//! every post at once, so they follow the conservative cascade rule in
//! [`crate::build`] instead of per-file cache gating.
//!
//! Fragments are plain HTML strings composed before template substitution
//! (the renderer has no loops or conditionals).

use crate::{config::SiteConfig, content::Post, enrich};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// ============================================================================
// Tag Index
// ============================================================================

/// Tag name → ordered non-draft posts carrying it. BTreeMap keeps tag order
/// deterministic across passes.
pub struct TagIndex<'a> {
    pub tags: BTreeMap<String, Vec<&'a Post>>,
}

impl<'a> TagIndex<'a> {
    /// Build the full index from the date-sorted post list.
    pub fn build(posts: &'a [Post]) -> Self {
        let mut tags: BTreeMap<String, Vec<&'a Post>> = BTreeMap::new();

        for post in posts.iter().filter(|p| !p.draft && !p.is_special()) {
            for tag in &post.tags {
                let entries = tags.entry(tag.clone()).or_default();
                // a post may list the same tag twice; index it once
                if !entries.iter().any(|p| p.slug == post.slug) {
                    entries.push(post);
                }
            }
        }

        Self { tags }
    }

    /// Occurrence count for one tag.
    pub fn count(&self, tag: &str) -> usize {
        self.tags.get(tag).map_or(0, Vec::len)
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// One contiguous slice of the globally date-sorted non-draft post sequence.
pub struct PageSlice<'a> {
    /// 1-based page number
    pub number: usize,
    pub total: usize,
    pub posts: Vec<&'a Post>,
}

impl PageSlice<'_> {
    pub fn prev(&self) -> Option<usize> {
        (self.number > 1).then(|| self.number - 1)
    }

    pub fn next(&self) -> Option<usize> {
        (self.number < self.total).then(|| self.number + 1)
    }
}

/// Slice the post sequence into pages of `per_page`. An empty sequence still
/// yields one (empty) page so the site root always exists.
pub fn paginate<'a>(posts: &[&'a Post], per_page: usize) -> Vec<PageSlice<'a>> {
    let total = posts.len().div_ceil(per_page).max(1);

    (0..total)
        .map(|i| PageSlice {
            number: i + 1,
            total,
            posts: posts
                .iter()
                .skip(i * per_page)
                .take(per_page)
                .copied()
                .collect(),
        })
        .collect()
}

// ============================================================================
// Date Formatting
// ============================================================================

/// Human date per the configured locale. English-family locales get month
/// names; everything else falls back to ISO `YYYY-MM-DD`.
pub fn format_date(date: &DateTime<Utc>, language: &str) -> String {
    if language.starts_with("en") {
        date.format("%B %-d, %Y").to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Machine-readable date for `<time datetime>` and feeds.
pub fn format_date_iso(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ============================================================================
// Fragments
// ============================================================================

/// Escape text for safe embedding in HTML.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Tag links for one post (the `tags` placeholder).
pub fn tag_links(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| {
            format!(
                r#"<a class="tag" href="/tags/{}.html">{}</a>"#,
                enrich::slugify(tag),
                escape_html(tag)
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Article card list (the `posts` placeholder).
pub fn post_list(posts: &[&Post], config: &SiteConfig) -> String {
    let items: String = posts
        .iter()
        .map(|post| {
            format!(
                concat!(
                    "<article class=\"post-card\">\n",
                    "  <h2><a href=\"{url}\">{title}</a></h2>\n",
                    "  <time datetime=\"{iso}\">{date}</time>\n",
                    "  <p>{description}</p>\n",
                    "  <div class=\"tags\">{tags}</div>\n",
                    "</article>\n"
                ),
                url = post.url(),
                title = escape_html(&post.title),
                iso = format_date_iso(&post.date),
                date = format_date(&post.date, &config.language),
                description = escape_html(&post.description),
                tags = tag_links(&post.tags),
            )
        })
        .collect();

    format!("<div class=\"post-list\">\n{items}</div>")
}

/// Previous/next navigation for a pagination page (the `pagination`
/// placeholder). Empty when there is a single page. `root_is_page_one`
/// says whether the site root mirrors page 1; with a custom root page the
/// newer link must target `/page/1.html` instead.
pub fn pagination_nav(page: &PageSlice, root_is_page_one: bool) -> String {
    if page.total <= 1 {
        return String::new();
    }

    let prev = page
        .prev()
        .map(|n| {
            let href = if n == 1 && root_is_page_one {
                "/".into()
            } else {
                format!("/page/{n}.html")
            };
            format!("<a class=\"prev\" href=\"{href}\">&larr; Newer</a>")
        })
        .unwrap_or_default();
    let next = page
        .next()
        .map(|n| format!("<a class=\"next\" href=\"/page/{n}.html\">Older &rarr;</a>"))
        .unwrap_or_default();

    format!(
        "<nav class=\"pagination\">{prev}<span>Page {} of {}</span>{next}</nav>",
        page.number, page.total
    )
}

/// All tags with occurrence counts, most used first (the `tagsList`
/// placeholder).
pub fn tags_list(index: &TagIndex) -> String {
    let mut entries: Vec<(&String, usize)> =
        index.tags.iter().map(|(tag, posts)| (tag, posts.len())).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let items: String = entries
        .iter()
        .map(|(tag, count)| {
            format!(
                "<li><a href=\"/tags/{}.html\">{}</a> <span class=\"count\">({count})</span></li>\n",
                enrich::slugify(tag),
                escape_html(tag)
            )
        })
        .collect();

    format!("<ul class=\"tags-list\">\n{items}</ul>")
}

/// Related-post links for one post (the `relatedPosts` placeholder). Empty
/// when nothing is related.
pub fn related_list(related: &[&Post]) -> String {
    if related.is_empty() {
        return String::new();
    }

    let items: String = related
        .iter()
        .map(|post| {
            format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                post.url(),
                escape_html(&post.title)
            )
        })
        .collect();

    format!("<aside class=\"related\"><h3>Related posts</h3><ul>\n{items}</ul></aside>")
}

/// Meta/OpenGraph tags for one post (the `metaTags` placeholder).
pub fn meta_tags(post: &Post, config: &SiteConfig) -> String {
    let description = if post.description.is_empty() {
        &config.description
    } else {
        &post.description
    };
    let url = format!("{}{}", config.site_url.trim_end_matches('/'), post.url());

    let mut tags = format!(
        concat!(
            "<meta name=\"description\" content=\"{description}\">\n",
            "<meta property=\"og:title\" content=\"{title}\">\n",
            "<meta property=\"og:description\" content=\"{description}\">\n",
            "<meta property=\"og:url\" content=\"{url}\">\n",
            "<meta property=\"og:type\" content=\"article\">"
        ),
        description = escape_html(description),
        title = escape_html(&post.title),
        url = escape_html(&url),
    );

    if let Some(image) = &post.image {
        tags.push_str(&format!(
            "\n<meta property=\"og:image\" content=\"{}\">",
            escape_html(image)
        ));
    }

    tags
}

/// Reading progress bar markup (the `progressBar` placeholder). Inert
/// without the stylesheet hooks; templates opt in by using the placeholder.
pub fn progress_bar() -> String {
    "<div class=\"progress-bar\" id=\"progress-bar\"></div>".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn make_post(slug: &str, tags: &[&str], draft: bool) -> Post {
        Post {
            slug: slug.into(),
            title: format!("Title of {slug}"),
            date: Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap(),
            description: "desc".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            template: "post".into(),
            draft,
            image: None,
            reading_time: 1,
            toc: String::new(),
            content: String::new(),
            source_path: PathBuf::from(format!("{slug}.md")),
        }
    }

    #[test]
    fn test_tag_index_excludes_drafts_and_special() {
        let posts = vec![
            make_post("a", &["x"], false),
            make_post("b", &["x"], true),
            make_post("index", &["x"], false),
        ];
        let index = TagIndex::build(&posts);
        assert_eq!(index.count("x"), 1);
    }

    #[test]
    fn test_tag_index_duplicate_tag_counted_once() {
        let posts = vec![make_post("a", &["x", "x"], false)];
        let index = TagIndex::build(&posts);
        assert_eq!(index.count("x"), 1);
    }

    #[test]
    fn test_paginate_25_by_10() {
        let posts: Vec<Post> = (0..25).map(|i| make_post(&format!("p{i:02}"), &[], false)).collect();
        let refs: Vec<&Post> = posts.iter().collect();
        let pages = paginate(&refs, 10);

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].posts.len(), 10);
        assert_eq!(pages[1].posts.len(), 10);
        assert_eq!(pages[2].posts.len(), 5);

        assert_eq!(pages[0].prev(), None);
        assert_eq!(pages[0].next(), Some(2));
        assert_eq!(pages[2].prev(), Some(2));
        assert_eq!(pages[2].next(), None);
    }

    #[test]
    fn test_paginate_empty_yields_one_page() {
        let pages = paginate(&[], 10);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].posts.is_empty());
        assert_eq!(pages[0].total, 1);
    }

    #[test]
    fn test_pagination_nav_edges() {
        let posts: Vec<Post> = (0..25).map(|i| make_post(&format!("p{i:02}"), &[], false)).collect();
        let refs: Vec<&Post> = posts.iter().collect();
        let pages = paginate(&refs, 10);

        let first = pagination_nav(&pages[0], true);
        assert!(!first.contains("Newer"));
        assert!(first.contains("/page/2.html"));

        let mid = pagination_nav(&pages[1], true);
        assert!(mid.contains(r#"href="/""#)); // page 1 lives at the root
        assert!(mid.contains("/page/3.html"));

        let last = pagination_nav(&pages[2], true);
        assert!(last.contains("Newer"));
        assert!(!last.contains("Older"));
    }

    #[test]
    fn test_pagination_nav_with_custom_root() {
        let posts: Vec<Post> = (0..25).map(|i| make_post(&format!("p{i:02}"), &[], false)).collect();
        let refs: Vec<&Post> = posts.iter().collect();
        let pages = paginate(&refs, 10);

        // the root is not page 1, so the newer link must not point there
        let mid = pagination_nav(&pages[1], false);
        assert!(mid.contains(r#"href="/page/1.html""#));
        assert!(!mid.contains(r#"href="/""#));
    }

    #[test]
    fn test_pagination_nav_single_page_empty() {
        let pages = paginate(&[], 10);
        assert_eq!(pagination_nav(&pages[0], true), "");
    }

    #[test]
    fn test_format_date_locales() {
        let date = Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap();
        assert_eq!(format_date(&date, "en-US"), "May 3, 2024");
        assert_eq!(format_date(&date, "de-DE"), "2024-05-03");
        assert_eq!(format_date_iso(&date), "2024-05-03");
    }

    #[test]
    fn test_tag_links_slugified() {
        let links = tag_links(&["Rust Lang".into()]);
        assert!(links.contains("/tags/rust-lang.html"));
        assert!(links.contains(">Rust Lang<"));
    }

    #[test]
    fn test_post_list_contains_cards() {
        let posts = vec![make_post("a", &["x"], false)];
        let refs: Vec<&Post> = posts.iter().collect();
        let html = post_list(&refs, &SiteConfig::default());

        assert!(html.contains("post-card"));
        assert!(html.contains("/a.html"));
        assert!(html.contains("Title of a"));
    }

    #[test]
    fn test_tags_list_sorted_by_count() {
        let posts = vec![
            make_post("a", &["rare", "common"], false),
            make_post("b", &["common"], false),
        ];
        let index = TagIndex::build(&posts);
        let html = tags_list(&index);

        let common_pos = html.find("common").unwrap();
        let rare_pos = html.find("rare").unwrap();
        assert!(common_pos < rare_pos);
        assert!(html.contains("(2)"));
    }

    #[test]
    fn test_related_list_empty() {
        assert_eq!(related_list(&[]), "");
    }

    #[test]
    fn test_meta_tags_with_image() {
        let mut post = make_post("a", &[], false);
        post.image = Some("/img/cover.png".into());
        let html = meta_tags(&post, &SiteConfig::default());

        assert!(html.contains(r#"property="og:image""#));
        assert!(html.contains("http://localhost:3000/a.html"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&"#), "&lt;a href=&quot;x&quot;&gt;&amp;");
    }
}
