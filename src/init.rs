//! Site scaffolding.
//!
//! Creates a new project with default configuration, templates, a
//! stylesheet and a sample post, all embedded at compile time.

use crate::config::{SiteConfig, CONFIG_FILE};
use anyhow::{bail, Context, Result};
use std::{fs, path::Path};

/// Default site directory structure
const SITE_DIRS: &[&str] = &["content", "templates", "static/css", "public"];

/// Embedded scaffold files, written relative to the project root
const SCAFFOLD_FILES: &[(&str, &str)] = &[
    ("templates/default.html", include_str!("embed/init/default.html")),
    ("templates/post.html", include_str!("embed/init/post.html")),
    ("templates/list.html", include_str!("embed/init/list.html")),
    ("templates/tag.html", include_str!("embed/init/tag.html")),
    ("static/css/style.css", include_str!("embed/init/style.css")),
    ("content/hello-world.md", include_str!("embed/init/hello-world.md")),
];

/// Build artifacts excluded from version control
const GITIGNORE: &str = "public/\n.velin-cache.json\n.velin-image-cache.json\n";

/// Create a new site with default structure.
///
/// When no directory name was given the current directory must be empty,
/// so a stray `init` cannot clobber an existing project.
pub fn new_site(root: &Path, has_name: bool) -> Result<()> {
    if !has_name && !is_dir_empty(root)? {
        bail!("Current directory is not empty. Use `velin init <DIR>` to create a subdirectory.");
    }

    init_site_structure(root)?;
    init_default_config(root)?;

    for (rel, content) in SCAFFOLD_FILES {
        fs::write(root.join(rel), content)
            .with_context(|| format!("Failed to write {rel}"))?;
    }

    let gitignore = root.join(".gitignore");
    if !gitignore.exists() {
        fs::write(&gitignore, GITIGNORE)?;
    }

    Ok(())
}

/// Check if a directory is completely empty.
fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Write the default configuration file.
fn init_default_config(root: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(&SiteConfig::default())?;
    fs::write(root.join(CONFIG_FILE), content)?;
    Ok(())
}

/// Create the site directory structure.
fn init_site_structure(root: &Path) -> Result<()> {
    for dir in SITE_DIRS {
        let path = root.join(dir);
        if path.exists() {
            bail!(
                "Path `{}` already exists. Try `velin init <DIR>` instead.",
                path.display()
            );
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build::build_site, config::SitePaths};

    #[test]
    fn test_scaffold_layout() {
        let dir = tempfile::tempdir().unwrap();
        new_site(dir.path(), true).unwrap();

        assert!(dir.path().join("site.json").exists());
        assert!(dir.path().join("templates/post.html").exists());
        assert!(dir.path().join("templates/list.html").exists());
        assert!(dir.path().join("static/css/style.css").exists());
        assert!(dir.path().join("content/hello-world.md").exists());
        assert!(dir.path().join(".gitignore").exists());
    }

    #[test]
    fn test_scaffold_config_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        new_site(dir.path(), true).unwrap();

        let config = SiteConfig::load(dir.path());
        assert_eq!(config.title, "My Site");
        assert_eq!(config.posts_per_page, 10);
    }

    #[test]
    fn test_init_refuses_nonempty_unnamed_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();
        assert!(new_site(dir.path(), false).is_err());
    }

    #[test]
    fn test_init_refuses_existing_structure() {
        let dir = tempfile::tempdir().unwrap();
        new_site(dir.path(), true).unwrap();
        assert!(new_site(dir.path(), true).is_err());
    }

    #[test]
    fn test_scaffold_builds_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        new_site(dir.path(), true).unwrap();

        let paths = SitePaths::new(dir.path());
        let outcome = build_site(&paths, true).unwrap();
        assert_eq!(outcome.total_posts, 1);

        let index = fs::read_to_string(paths.output.join("index.html")).unwrap();
        assert!(index.contains("Hello, World"));
        assert!(paths.output.join("hello-world.html").exists());
        assert!(paths.output.join("tags/meta.html").exists());
        assert!(paths.output.join("css/style.css").exists());
    }
}
