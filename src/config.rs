//! Site configuration management.
//!
//! Handles loading, parsing, and defaulting of the `site.json` configuration
//! file. A malformed config file is a recoverable condition: it logs a
//! warning and the build proceeds with full defaults. Unknown keys are
//! ignored.

use crate::log;
use anyhow::Result;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Default config filename
pub const CONFIG_FILE: &str = "site.json";

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Json(#[from] serde_json::Error),
}

/// Default values for serde deserialization
pub mod config_defaults {
    pub fn title() -> String {
        "My Site".into()
    }
    pub fn description() -> String {
        "A static site".into()
    }
    pub fn site_url() -> String {
        "http://localhost:3000".into()
    }
    pub fn author() -> String {
        "Anonymous".into()
    }
    pub fn posts_per_page() -> usize {
        10
    }
    pub fn language() -> String {
        "en-US".into()
    }
}

/// The `site.json` configuration file.
///
/// Keys use the camelCase spelling of the on-disk format. Missing keys fall
/// back to built-in defaults; unknown keys are ignored.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Site title
    #[serde(default = "config_defaults::title")]
    #[educe(Default = config_defaults::title())]
    pub title: String,

    /// Site description, used for meta tags and feeds
    #[serde(default = "config_defaults::description")]
    #[educe(Default = config_defaults::description())]
    pub description: String,

    /// Absolute base URL, e.g.: "https://example.com"
    #[serde(default = "config_defaults::site_url")]
    #[educe(Default = config_defaults::site_url())]
    pub site_url: String,

    /// Author name for feeds and meta tags
    #[serde(default = "config_defaults::author")]
    #[educe(Default = config_defaults::author())]
    pub author: String,

    /// Posts per pagination page (positive)
    #[serde(default = "config_defaults::posts_per_page")]
    #[educe(Default = config_defaults::posts_per_page())]
    pub posts_per_page: usize,

    /// Locale tag for date formatting, e.g.: "en-US"
    #[serde(default = "config_defaults::language")]
    #[educe(Default = config_defaults::language())]
    pub language: String,
}

impl SiteConfig {
    /// Parse configuration from a JSON string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Parse configuration from a file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load configuration from a project root.
    ///
    /// Missing file silently yields defaults; an unreadable or malformed
    /// file logs a warning and yields defaults (the build must not abort on
    /// config problems).
    pub fn load(root: &Path) -> Self {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }

        match Self::from_path(&path) {
            Ok(mut config) => {
                if config.posts_per_page == 0 {
                    log!("warn"; "postsPerPage must be positive, using default");
                    config.posts_per_page = config_defaults::posts_per_page();
                }
                config
            }
            Err(err) => {
                log!("warn"; "ignoring {}: {err}, using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ============================================================================
// Project Layout
// ============================================================================

/// Directory and file layout of a project, derived from its root.
///
/// The layout is a fixed convention; only the root varies.
#[derive(Debug, Clone)]
pub struct SitePaths {
    pub root: PathBuf,
    /// Markdown source tree
    pub content: PathBuf,
    /// Render templates (`*.html` with `{{name}}` placeholders)
    pub templates: PathBuf,
    /// Static assets copied verbatim (images routed through the transcoder)
    pub statics: PathBuf,
    /// Build output tree
    pub output: PathBuf,
    /// Config file
    pub config_file: PathBuf,
    /// Persisted content-hash snapshot
    pub cache_file: PathBuf,
    /// Persisted image-hash snapshot
    pub image_cache_file: PathBuf,
}

impl SitePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            content: root.join("content"),
            templates: root.join("templates"),
            statics: root.join("static"),
            output: root.join("public"),
            config_file: root.join(CONFIG_FILE),
            cache_file: root.join(".velin-cache.json"),
            image_cache_file: root.join(".velin-image-cache.json"),
            root,
        }
    }
}
