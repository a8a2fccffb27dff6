//! Site building orchestration.
//!
//! One build pass runs sequentially: config → templates → posts → cache-gated
//! per-post rendering → aggregate pages → feeds → static assets → cache
//! persistence. The pass is non-resumable; the cache snapshots are persisted
//! only at the very end, so a crash mid-pass never makes a later pass believe
//! partial output is complete.
//!
//! Cascade rule: per-post output is gated on the content hash of its own
//! source, but the root page, tag pages and pagination pages aggregate
//! across all posts and are regenerated whenever anything changed.

use crate::{
    assets,
    cache::{self, BuildCache},
    config::{SiteConfig, SitePaths},
    content::{self, Post},
    enrich, feeds, log,
    pages::{self, TagIndex},
    template::{self, Templates},
};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::{fs, path::Path};

/// Summary of one build pass.
#[derive(Debug, Clone, Copy)]
pub struct BuildOutcome {
    /// Posts whose output was (re)generated this pass
    pub rebuilt_posts: usize,
    /// All non-draft posts seen
    pub total_posts: usize,
}

/// Run one build pass. `full` ignores the cache and clears the output
/// directory first; an incremental pass only overwrites and adds.
///
/// Per-post gating hashes the markdown source only. Editing a template
/// refreshes aggregate pages but not already-written post pages; a full
/// pass propagates template changes to unchanged posts.
pub fn build_site(paths: &SitePaths, full: bool) -> Result<BuildOutcome> {
    let config = SiteConfig::load(&paths.root);
    let templates = template::load_templates(&paths.templates)?;
    let posts = load_sorted_posts(&paths.content)?;

    prepare_output(&paths.output, full)?;

    let mut content_cache = BuildCache::load(&paths.cache_file);
    let mut image_cache = BuildCache::load(&paths.image_cache_file);

    // Per-post rendering, cache-gated. A recorded hash means the page was
    // actually written; a skipped post stays unrecorded so the next pass
    // retries it.
    let mut rebuilt = 0usize;
    for post in posts.iter().filter(|p| !p.draft) {
        let hash = cache::hash_file(&post.source_path)?;
        if content_cache.should_rebuild(&post.source_path, &hash, full) {
            if !render_post_page(post, &posts, &templates, &config, &paths.output)? {
                continue;
            }
            rebuilt += 1;
        }
        content_cache.record(&post.source_path, hash);
    }

    // Aggregate pages: always regenerated, coarse-grained by design
    let listed = listed_posts(&posts);
    let index = TagIndex::build(&posts);
    render_tag_pages(&index, &templates, &config, &paths.output)?;
    render_pagination_pages(&listed, &index, &posts, &templates, &config, &paths.output)?;

    feeds::write_rss(&posts, &config, &paths.output)?;
    feeds::write_sitemap(&posts, &config, &paths.output)?;

    let asset_count = assets::process_static(paths, &mut image_cache, full)?;
    copy_custom_not_found(paths)?;

    content_cache.persist()?;
    image_cache.persist()?;

    let total_posts = posts.iter().filter(|p| !p.draft).count();
    log!("build"; "{rebuilt}/{total_posts} posts, {asset_count} assets");

    Ok(BuildOutcome {
        rebuilt_posts: rebuilt,
        total_posts,
    })
}

/// Load all posts, newest first. Source enumeration is path-sorted and the
/// date sort is stable, so pass order is deterministic.
fn load_sorted_posts(content_root: &Path) -> Result<Vec<Post>> {
    let mut posts = content::load_posts(content_root)?;
    posts.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(posts)
}

/// Non-draft, non-special posts in listing order.
fn listed_posts(posts: &[Post]) -> Vec<&Post> {
    posts.iter().filter(|p| !p.draft && !p.is_special()).collect()
}

/// Create the output directory; a full rebuild clears it first.
fn prepare_output(output: &Path, full: bool) -> Result<()> {
    if full && output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear {}", output.display()))?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    Ok(())
}

// ============================================================================
// Post Pages
// ============================================================================

/// Render one post with its named template (falling back to `post` then
/// `default`) and write `{slug}.html`. A missing template logs and skips the
/// document; the rest of the pass proceeds. Returns whether the page was
/// written.
fn render_post_page(
    post: &Post,
    all: &[Post],
    templates: &Templates,
    config: &SiteConfig,
    output: &Path,
) -> Result<bool> {
    let Some(tpl) = template::select(templates, &post.template) else {
        log!("warn"; "no template for {}, skipping", post.slug);
        return Ok(false);
    };

    let related = enrich::related_posts(post, all);

    let mut vars = site_vars(config);
    vars.insert("title", pages::escape_html(&post.title));
    vars.insert("content", post.content.clone());
    vars.insert("date", pages::format_date(&post.date, &config.language));
    vars.insert("dateISO", pages::format_date_iso(&post.date));
    vars.insert("description", pages::escape_html(&post.description));
    vars.insert("tags", pages::tag_links(&post.tags));
    vars.insert("toc", post.toc.clone());
    vars.insert("readingTime", post.reading_time.to_string());
    vars.insert("relatedPosts", pages::related_list(&related));
    vars.insert("metaTags", pages::meta_tags(post, config));
    vars.insert("progressBar", pages::progress_bar());

    let html = template::render(tpl, &vars);
    write_html(&output.join(format!("{}.html", post.slug)), &html)?;
    Ok(true)
}

// ============================================================================
// Aggregate Pages
// ============================================================================

/// One tag page per tag: `tags/{slugified-tag}.html`.
fn render_tag_pages(
    index: &TagIndex,
    templates: &Templates,
    config: &SiteConfig,
    output: &Path,
) -> Result<()> {
    for (tag, posts) in &index.tags {
        let Some(tpl) = template::select(templates, "tag") else {
            log!("warn"; "no template for tag pages, skipping");
            return Ok(());
        };

        let mut vars = list_vars(config, index);
        vars.insert("title", pages::escape_html(tag));
        vars.insert("posts", pages::post_list(posts, config));
        vars.insert("pagination", String::new());

        let html = template::render(tpl, &vars);
        write_html(
            &output.join("tags").join(format!("{}.html", enrich::slugify(tag))),
            &html,
        )?;
    }
    Ok(())
}

/// Pagination pages `page/{n}.html`; page 1 is mirrored to the output root
/// unless an explicit root document (`index` slug) exists.
fn render_pagination_pages(
    listed: &[&Post],
    index: &TagIndex,
    all: &[Post],
    templates: &Templates,
    config: &SiteConfig,
    output: &Path,
) -> Result<()> {
    let Some(tpl) = template::select(templates, "list") else {
        log!("warn"; "no template for list pages, skipping");
        return Ok(());
    };

    let has_custom_root = all.iter().any(|p| p.slug == "index" && !p.draft);

    for page in pages::paginate(listed, config.posts_per_page) {
        let mut vars = list_vars(config, index);
        vars.insert("title", pages::escape_html(&config.title));
        vars.insert("posts", pages::post_list(&page.posts, config));
        vars.insert("pagination", pages::pagination_nav(&page, !has_custom_root));

        let html = template::render(tpl, &vars);
        write_html(&output.join("page").join(format!("{}.html", page.number)), &html)?;

        if page.number == 1 && !has_custom_root {
            write_html(&output.join("index.html"), &html)?;
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Placeholder values shared by every page.
fn site_vars(config: &SiteConfig) -> FxHashMap<&'static str, String> {
    let mut vars = FxHashMap::default();
    vars.insert("siteTitle", pages::escape_html(&config.title));
    vars.insert("siteUrl", config.site_url.clone());
    vars.insert("author", pages::escape_html(&config.author));
    vars
}

/// Placeholder values for list-style pages (root, tags, pagination).
fn list_vars<'a>(config: &SiteConfig, index: &TagIndex) -> FxHashMap<&'a str, String> {
    let mut vars = site_vars(config);
    vars.insert("description", pages::escape_html(&config.description));
    vars.insert("tagsList", pages::tags_list(index));
    vars.insert("metaTags", format!(
        "<meta name=\"description\" content=\"{}\">",
        pages::escape_html(&config.description)
    ));
    vars.insert("progressBar", String::new());
    vars
}

fn write_html(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))
}

/// A `404.html` in the templates directory is copied verbatim as the
/// not-found document, unless the content tree already produced one. The
/// 404 page is a build artifact; the server never resolves it dynamically.
fn copy_custom_not_found(paths: &SitePaths) -> Result<()> {
    let custom = paths.templates.join("404.html");
    let dest = paths.output.join("404.html");
    if custom.exists() && !dest.exists() {
        fs::copy(&custom, &dest)
            .with_context(|| format!("Failed to copy {}", custom.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use std::path::PathBuf;
    use walkdir::WalkDir;

    const POST_TPL: &str =
        "<html><body><h1>{{title}}</h1>{{content}}{{relatedPosts}}</body></html>";
    const LIST_TPL: &str = "<html><body>{{posts}}{{pagination}}{{tagsList}}</body></html>";

    fn project() -> (tempfile::TempDir, SitePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = SitePaths::new(dir.path());
        fs::create_dir_all(&paths.content).unwrap();
        fs::create_dir_all(&paths.templates).unwrap();
        fs::write(paths.templates.join("post.html"), POST_TPL).unwrap();
        fs::write(paths.templates.join("list.html"), LIST_TPL).unwrap();
        fs::write(paths.templates.join("tag.html"), LIST_TPL).unwrap();
        (dir, paths)
    }

    fn write_post(paths: &SitePaths, rel: &str, title: &str, date: &str, tags: &str) {
        let path = paths.content.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            format!("---\ntitle: {title}\ndate: {date}\ntags: {tags}\n---\n\nbody of {title}\n"),
        )
        .unwrap();
    }

    fn snapshot(output: &Path) -> FxHashMap<PathBuf, Vec<u8>> {
        WalkDir::new(output)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let path = e.into_path();
                let bytes = fs::read(&path).unwrap();
                (path.strip_prefix(output).unwrap().to_path_buf(), bytes)
            })
            .collect()
    }

    #[test]
    fn test_full_build_writes_everything() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "x");
        write_post(&paths, "b.md", "Second", "2024-01-02", "x, y");

        let outcome = build_site(&paths, true).unwrap();
        assert_eq!(outcome.rebuilt_posts, 2);

        assert!(paths.output.join("a.html").exists());
        assert!(paths.output.join("b.html").exists());
        assert!(paths.output.join("index.html").exists());
        assert!(paths.output.join("page/1.html").exists());
        assert!(paths.output.join("tags/x.html").exists());
        assert!(paths.output.join("tags/y.html").exists());
        assert!(paths.output.join("rss.xml").exists());
        assert!(paths.output.join("sitemap.xml").exists());
    }

    #[test]
    fn test_idempotent_full_builds() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "x");
        write_post(&paths, "b.md", "Second", "2024-01-02", "y");

        build_site(&paths, true).unwrap();
        let first = snapshot(&paths.output);
        build_site(&paths, true).unwrap();
        let second = snapshot(&paths.output);

        assert_eq!(first, second);
    }

    #[test]
    fn test_incremental_rebuild_scope() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "x");
        write_post(&paths, "b.md", "Second", "2024-01-02", "x");

        build_site(&paths, true).unwrap();
        let before = snapshot(&paths.output);

        write_post(&paths, "a.md", "First Edited", "2024-01-01", "x");
        let outcome = build_site(&paths, false).unwrap();

        assert_eq!(outcome.rebuilt_posts, 1);
        let after = snapshot(&paths.output);

        // changed post regenerated, untouched post byte-identical
        assert_ne!(before[Path::new("a.html")], after[Path::new("a.html")]);
        assert_eq!(before[Path::new("b.html")], after[Path::new("b.html")]);

        // aggregates reflect the change
        let index = String::from_utf8(after[Path::new("index.html")].clone()).unwrap();
        assert!(index.contains("First Edited"));
        let tag = String::from_utf8(after[Path::new("tags/x.html")].clone()).unwrap();
        assert!(tag.contains("First Edited"));
    }

    #[test]
    fn test_unchanged_sources_rebuild_nothing() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "x");

        build_site(&paths, true).unwrap();
        let outcome = build_site(&paths, false).unwrap();
        assert_eq!(outcome.rebuilt_posts, 0);
    }

    #[test]
    fn test_full_build_clears_output() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "");
        fs::create_dir_all(&paths.output).unwrap();
        fs::write(paths.output.join("stale.html"), "old").unwrap();

        build_site(&paths, true).unwrap();
        assert!(!paths.output.join("stale.html").exists());
    }

    #[test]
    fn test_incremental_build_keeps_existing_output() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "");
        fs::create_dir_all(&paths.output).unwrap();
        fs::write(paths.output.join("stale.html"), "old").unwrap();

        build_site(&paths, false).unwrap();
        assert!(paths.output.join("stale.html").exists());
    }

    #[test]
    fn test_drafts_produce_no_output() {
        let (_dir, paths) = project();
        let path = paths.content.join("hidden.md");
        fs::write(&path, "---\ntitle: Hidden\ndraft: true\n---\n\nshh").unwrap();

        build_site(&paths, true).unwrap();
        assert!(!paths.output.join("hidden.html").exists());

        let index = fs::read_to_string(paths.output.join("index.html")).unwrap();
        assert!(!index.contains("Hidden"));
    }

    #[test]
    fn test_custom_root_page_not_overwritten() {
        let (_dir, paths) = project();
        write_post(&paths, "index.md", "Welcome", "2024-01-01", "");
        write_post(&paths, "a.md", "First", "2024-01-02", "");

        build_site(&paths, true).unwrap();
        let index = fs::read_to_string(paths.output.join("index.html")).unwrap();
        assert!(index.contains("Welcome"));
    }

    #[test]
    fn test_custom_root_pagination_links_page_one() {
        let (_dir, paths) = project();
        write_post(&paths, "index.md", "Welcome", "2024-01-01", "");
        for i in 0..15 {
            write_post(
                &paths,
                &format!("p{i:02}.md"),
                &format!("Post {i}"),
                &format!("2024-02-{:02}", i + 1),
                "",
            );
        }

        build_site(&paths, true).unwrap();
        let page2 = fs::read_to_string(paths.output.join("page/2.html")).unwrap();

        // the root is the custom page, so newer must go to page 1 itself
        assert!(page2.contains(r#"href="/page/1.html""#));
        assert!(!page2.contains(r#"href="/""#));
    }

    #[test]
    fn test_missing_template_skips_document() {
        let (_dir, paths) = project();
        fs::remove_file(paths.templates.join("post.html")).unwrap();
        fs::remove_file(paths.templates.join("list.html")).unwrap();
        fs::remove_file(paths.templates.join("tag.html")).unwrap();
        write_post(&paths, "a.md", "First", "2024-01-01", "");

        // no templates at all: pass succeeds, just no page output
        let outcome = build_site(&paths, true).unwrap();
        assert_eq!(outcome.rebuilt_posts, 0);
        assert!(!paths.output.join("a.html").exists());
        assert!(paths.output.join("rss.xml").exists());
    }

    #[test]
    fn test_skipped_post_renders_once_template_appears() {
        let (_dir, paths) = project();
        fs::remove_file(paths.templates.join("post.html")).unwrap();
        fs::remove_file(paths.templates.join("list.html")).unwrap();
        fs::remove_file(paths.templates.join("tag.html")).unwrap();
        write_post(&paths, "a.md", "First", "2024-01-01", "");

        // skipped page must not be remembered as written
        build_site(&paths, true).unwrap();
        assert!(!paths.output.join("a.html").exists());

        fs::write(paths.templates.join("post.html"), POST_TPL).unwrap();
        let outcome = build_site(&paths, false).unwrap();

        assert_eq!(outcome.rebuilt_posts, 1);
        assert!(paths.output.join("a.html").exists());
    }

    #[test]
    fn test_custom_404_copied_from_templates() {
        let (_dir, paths) = project();
        write_post(&paths, "a.md", "First", "2024-01-01", "");
        fs::write(paths.templates.join("404.html"), "<h1>lost</h1>").unwrap();

        build_site(&paths, true).unwrap();
        let not_found = fs::read_to_string(paths.output.join("404.html")).unwrap();
        assert_eq!(not_found, "<h1>lost</h1>");
    }

    #[test]
    fn test_pagination_output_files() {
        let (_dir, paths) = project();
        for i in 0..25 {
            write_post(
                &paths,
                &format!("p{i:02}.md"),
                &format!("Post {i}"),
                &format!("2024-01-{:02}", (i % 27) + 1),
                "",
            );
        }
        fs::write(
            paths.root.join("site.json"),
            r#"{ "postsPerPage": 10 }"#,
        )
        .unwrap();

        build_site(&paths, true).unwrap();
        assert!(paths.output.join("page/1.html").exists());
        assert!(paths.output.join("page/2.html").exists());
        assert!(paths.output.join("page/3.html").exists());
        assert!(!paths.output.join("page/4.html").exists());
    }
}
