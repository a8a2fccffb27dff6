//! File system watcher for live reload.
//!
//! Monitors the content, template and static directories plus the config
//! file, debounces bursts of events into a single incremental rebuild, and
//! drives the dev server's reload hooks on success.
//!
//! The event loop owns all watch state: a single debounce window is
//! restarted by each event, and the loop itself is the only trigger for
//! builds, so two rebuilds can never interleave over the output directory.
//! A failed rebuild logs and leaves the previously served output (and every
//! connected client) untouched.

use crate::{
    build::build_site,
    config::SitePaths,
    log,
    logger::WatchStatus,
    serve,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::RecvTimeoutError,
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 150;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path as relative for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events; each event restarts the window.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Rebuild
// =============================================================================

/// Run one incremental rebuild and notify the dev server. The build error
/// path only reports; serving continues from the last good output.
fn rebuild(paths: &SitePaths, changed: &[PathBuf], status: &mut WatchStatus) {
    let trigger = changed
        .iter()
        .map(|p| rel_path(p, &paths.root))
        .collect::<Vec<_>>()
        .join(", ");

    match build_site(paths, false) {
        Ok(outcome) => {
            serve::clear_file_cache();
            serve::broadcast_reload();
            status.success(&format!(
                "rebuilt {}/{} posts ({trigger})",
                outcome.rebuilt_posts, outcome.total_posts
            ));
        }
        Err(err) => {
            status.error(&format!("build failed ({trigger})"), &format!("{err:#}"));
        }
    }
}

// =============================================================================
// Watcher Setup
// =============================================================================

fn setup_watchers(watcher: &mut impl Watcher, paths: &SitePaths) -> Result<()> {
    let roots = [
        (&paths.content, RecursiveMode::Recursive),
        (&paths.templates, RecursiveMode::Recursive),
        (&paths.statics, RecursiveMode::Recursive),
        (&paths.config_file, RecursiveMode::NonRecursive),
    ];

    let mut watched = Vec::new();
    for (path, mode) in roots {
        if path.exists() {
            watcher
                .watch(path, mode)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            watched.push(rel_path(path, &paths.root));
        }
    }

    log!("watch"; "{}", watched.join(", "));
    Ok(())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Start the blocking watch loop with debouncing and live rebuild.
pub fn watch_for_changes_blocking(paths: &SitePaths) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    setup_watchers(&mut watcher, paths)?;

    let mut debouncer = Debouncer::new();
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                rebuild(paths, &debouncer.take(), &mut status);
            }
            Err(RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, idle timeouts
            _ => {}
        }
    }

    Ok(())
}
