//! Template loading and placeholder rendering.
//!
//! Templates are plain HTML documents with `{{name}}` placeholders. Only
//! names present in the substitution mapping are replaced; any other
//! placeholder stays literally in the output. There is no nesting, no
//! conditionals and no loops: composition happens by pre-rendering HTML
//! fragments into strings before substitution.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::{fs, path::Path};

/// Name-keyed template contents loaded from a project's templates directory.
pub type Templates = FxHashMap<String, String>;

/// Load every `*.html` template into a name-keyed mapping.
///
/// A missing templates directory yields an empty mapping (the renderer will
/// then skip documents, per the missing-template policy).
pub fn load_templates(dir: &Path) -> Result<Templates> {
    let mut templates = Templates::default();
    if !dir.exists() {
        return Ok(templates);
    }

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "html") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        templates.insert(name.to_owned(), content);
    }

    Ok(templates)
}

/// Select a template by name, falling back to `post` then `default`.
pub fn select<'a>(templates: &'a Templates, name: &str) -> Option<&'a str> {
    [name, "post", "default"]
        .iter()
        .find_map(|n| templates.get(*n))
        .map(String::as_str)
}

/// Substitute `{{name}}` placeholders for every name present in `vars`.
pub fn render(template: &str, vars: &FxHashMap<&str, String>) -> String {
    let mut out = template.to_owned();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}
