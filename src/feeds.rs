//! RSS and sitemap generation.
//!
//! Both feeds are regenerated every pass from the already-loaded post set
//! (aggregate artifacts follow the cascade rule, never per-file gating).

use crate::{config::SiteConfig, content::Post, log, pages};
use anyhow::{anyhow, Context, Result};
use rss::{validation::Validate, ChannelBuilder, GuidBuilder, ItemBuilder};
use std::{fs, path::Path};

/// Most-recent post count included in the RSS feed
const RSS_LIMIT: usize = 20;

/// XML namespace for sitemap
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

// ============================================================================
// RSS
// ============================================================================

/// Generate `rss.xml` from the date-sorted post list.
pub fn write_rss(posts: &[Post], config: &SiteConfig, output: &Path) -> Result<()> {
    let xml = rss_xml(posts, config)?;
    let path = output.join("rss.xml");
    fs::write(&path, xml)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log!("feeds"; "rss.xml");
    Ok(())
}

fn rss_xml(posts: &[Post], config: &SiteConfig) -> Result<String> {
    let items: Vec<_> = posts
        .iter()
        .filter(|p| !p.draft && !p.is_special())
        .take(RSS_LIMIT)
        .map(|post| post_to_item(post, config))
        .collect();

    let channel = ChannelBuilder::default()
        .title(config.title.clone())
        .link(config.site_url.clone())
        .description(config.description.clone())
        .language(config.language.clone())
        .generator("velin".to_string())
        .items(items)
        .build();

    channel
        .validate()
        .map_err(|e| anyhow!("rss validation failed: {e}"))?;
    Ok(channel.to_string())
}

fn post_to_item(post: &Post, config: &SiteConfig) -> rss::Item {
    let link = absolute_url(config, &post.url());

    ItemBuilder::default()
        .title(post.title.clone())
        .link(Some(link.clone()))
        .guid(GuidBuilder::default().permalink(true).value(link).build())
        .description((!post.description.is_empty()).then(|| post.description.clone()))
        .pub_date(post.date.to_rfc2822())
        .author(format!("{} ({})", config.site_url, config.author))
        .build()
}

// ============================================================================
// Sitemap
// ============================================================================

/// Generate `sitemap.xml`: the site root plus every non-draft post URL.
pub fn write_sitemap(posts: &[Post], config: &SiteConfig, output: &Path) -> Result<()> {
    let xml = sitemap_xml(posts, config);
    let path = output.join("sitemap.xml");
    fs::write(&path, xml)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log!("feeds"; "sitemap.xml");
    Ok(())
}

fn sitemap_xml(posts: &[Post], config: &SiteConfig) -> String {
    let mut xml = String::with_capacity(4096);

    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#));
    xml.push('\n');

    push_url(&mut xml, &absolute_url(config, "/"), None);

    for post in posts.iter().filter(|p| !p.draft && p.slug != "index" && p.slug != "404") {
        push_url(
            &mut xml,
            &absolute_url(config, &post.url()),
            Some(pages::format_date_iso(&post.date)),
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

fn push_url(xml: &mut String, loc: &str, lastmod: Option<String>) {
    xml.push_str("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(loc)));
    if let Some(lastmod) = lastmod {
        xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
    }
    xml.push_str("  </url>\n");
}

fn absolute_url(config: &SiteConfig, path: &str) -> String {
    format!("{}{path}", config.site_url.trim_end_matches('/'))
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
