//! Development server with live reload support.
//!
//! A lightweight HTTP server over the build output directory, built on
//! `tiny_http`:
//!
//! - Static file serving with a bounded, mtime-validated in-memory cache
//! - Content-hash ETags with `If-None-Match` / 304 handling
//! - Path sanitization (traversal, backslash and double-slash requests
//!   are rejected with 403)
//! - Live reload: HTML responses get an event-source snippet, and
//!   `/__live-reload` is a persistent `text/event-stream`
//! - Graceful shutdown on Ctrl+C
//!
//! Each request is handled on its own thread; live-reload subscribers keep
//! their thread parked on a channel until the next broadcast.

use crate::{cache, log};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fs,
    io::{self, Read},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, LazyLock,
    },
    thread,
    time::SystemTime,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use rustc_hash::FxHashMap;

/// Live-reload client snippet spliced into HTML responses
const RELOAD_SNIPPET: &str = include_str!("embed/serve/reload.html");

/// Event-stream endpoint the snippet subscribes to
const LIVE_RELOAD_PATH: &str = "/__live-reload";

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Served-file cache entry limit
const FILE_CACHE_CAPACITY: usize = 128;

static FILE_CACHE: LazyLock<Mutex<FileCache>> =
    LazyLock::new(|| Mutex::new(FileCache::new(FILE_CACHE_CAPACITY)));

static LIVE_CLIENTS: LazyLock<Mutex<Vec<Sender<()>>>> = LazyLock::new(|| Mutex::new(Vec::new()));

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server over `output` and block until Ctrl+C.
pub fn serve_site(output: &Path, port: u16) -> Result<()> {
    let interface = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let (server, addr) = try_bind_port(interface, port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    for request in server.incoming_requests() {
        let root = output.to_path_buf();
        thread::spawn(move || {
            if let Err(e) = handle_request(request, &root) {
                log!("serve"; "request error: {e}");
            }
        });
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < max_retries => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    max_retries,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

// ============================================================================
// Rebuild Hooks
// ============================================================================

/// Drop every cached file. Called after a rebuild; mtime validation alone
/// can miss aggregate pages rewritten within the filesystem's timestamp
/// granularity.
pub fn clear_file_cache() {
    FILE_CACHE.lock().clear();
}

/// Notify every connected live-reload client. Clients whose channel is gone
/// are pruned.
pub fn broadcast_reload() {
    let mut clients = LIVE_CLIENTS.lock();
    clients.retain(|tx| tx.send(()).is_ok());
    if !clients.is_empty() {
        log!("reload"; "{} client(s)", clients.len());
    }
}

// ============================================================================
// Request Handling
// ============================================================================

fn handle_request(request: Request, root: &Path) -> Result<()> {
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| request.url().to_string());

    // Strip query string (e.g., ?t=123456) before resolving path
    let path = url_path.split('?').next().unwrap_or(&url_path).to_string();

    if path == LIVE_RELOAD_PATH {
        return serve_event_stream(request);
    }

    if is_forbidden(&path) {
        return respond_plain(request, 403, "403 Forbidden");
    }

    let Some(local_path) = resolve(root, path.trim_matches('/')) else {
        return serve_not_found(request, root);
    };

    let Some(file) = fetch(&local_path)? else {
        return serve_not_found(request, root);
    };

    // Conditional request: matching fingerprint short-circuits the body
    if if_none_match(&request).is_some_and(|tag| tag == file.etag) {
        let mut response = Response::empty(StatusCode(304)).with_header(etag_header(&file.etag));
        for header in security_headers() {
            response = response.with_header(header);
        }
        request.respond(response)?;
        return Ok(());
    }

    let content_type = guess_content_type(&local_path);
    let is_html = content_type.starts_with("text/html");
    let body = if is_html {
        inject_reload_snippet(&file.bytes)
    } else {
        file.bytes.clone()
    };

    let mut response = Response::from_data(body)
        .with_header(header("Content-Type", content_type))
        .with_header(header("Cache-Control", cache_control(&local_path, true)))
        .with_header(etag_header(&file.etag));
    for h in security_headers() {
        response = response.with_header(h);
    }

    request.respond(response)?;
    Ok(())
}

/// Reject request paths that could escape the output root. The path has
/// already been percent-decoded, so encoded traversal sequences are caught
/// here too.
fn is_forbidden(path: &str) -> bool {
    path.contains('\\')
        || path.contains("//")
        || path.split('/').any(|segment| segment == "..")
}

/// Map a sanitized request path onto the output tree. The root serves
/// `index.html`; extension-less paths retry with `.html` appended.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    if request_path.is_empty() {
        return Some(root.join("index.html"));
    }

    let direct = root.join(request_path);
    if direct.is_file() {
        return Some(direct);
    }

    if Path::new(request_path).extension().is_none() {
        let with_html = root.join(format!("{request_path}.html"));
        if with_html.is_file() {
            return Some(with_html);
        }
    }

    None
}

/// Serve the custom not-found document when the build produced one.
fn serve_not_found(request: Request, root: &Path) -> Result<()> {
    let custom = root.join("404.html");
    if let Some(file) = fetch(&custom)? {
        let mut response = Response::from_data(inject_reload_snippet(&file.bytes))
            .with_status_code(StatusCode(404))
            .with_header(header("Content-Type", "text/html; charset=utf-8"))
            .with_header(header("Cache-Control", "no-store"));
        for h in security_headers() {
            response = response.with_header(h);
        }
        request.respond(response)?;
        return Ok(());
    }

    respond_plain(request, 404, "404 Not Found")
}

fn respond_plain(request: Request, status: u16, body: &'static str) -> Result<()> {
    let mut response = Response::from_string(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "text/plain; charset=utf-8"));
    for h in security_headers() {
        response = response.with_header(h);
    }
    request.respond(response)?;
    Ok(())
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}

fn etag_header(etag: &str) -> Header {
    header("ETag", etag)
}

fn security_headers() -> Vec<Header> {
    vec![
        header("X-Content-Type-Options", "nosniff"),
        header("X-Frame-Options", "SAMEORIGIN"),
        header("X-XSS-Protection", "1; mode=block"),
        header("Referrer-Policy", "strict-origin-when-cross-origin"),
    ]
}

fn if_none_match(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("If-None-Match"))
        .map(|h| h.value.as_str().to_string())
}

// ============================================================================
// Live Reload
// ============================================================================

/// Hold the connection open as a `text/event-stream`; each rebuild broadcast
/// becomes one `reload` event. The response body blocks on the channel, so
/// the request thread parks until there is something to push.
fn serve_event_stream(request: Request) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    LIVE_CLIENTS.lock().push(tx);

    let mut response = Response::new(
        StatusCode(200),
        vec![
            header("Content-Type", "text/event-stream"),
            header("Cache-Control", "no-store"),
        ],
        ReloadStream::new(rx),
        None,
        None,
    );
    for h in security_headers() {
        response = response.with_header(h);
    }

    request.respond(response)?;
    Ok(())
}

/// Blocking reader bridging the broadcast channel into an SSE body.
struct ReloadStream {
    rx: Receiver<()>,
    pending: Vec<u8>,
}

impl ReloadStream {
    fn new(rx: Receiver<()>) -> Self {
        // Initial comment flushes headers to the client right away
        Self {
            rx,
            pending: b": connected\n\n".to_vec(),
        }
    }
}

impl Read for ReloadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(()) => self.pending.extend_from_slice(b"data: reload\n\n"),
                // All senders gone: end the stream
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Splice the reload snippet before `</body>`, or append it when the
/// document has no closing body tag.
fn inject_reload_snippet(html: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(html);
    match text.rfind("</body>") {
        Some(i) => format!("{}{}{}", &text[..i], RELOAD_SNIPPET, &text[i..]).into_bytes(),
        None => {
            let mut out = html.to_vec();
            out.extend_from_slice(RELOAD_SNIPPET.as_bytes());
            out
        }
    }
}

// ============================================================================
// File Cache
// ============================================================================

/// Bounded served-file cache. Entries are valid while the file's mtime has
/// not advanced; at capacity the oldest-inserted entry is evicted.
struct FileCache {
    capacity: usize,
    order: VecDeque<PathBuf>,
    entries: FxHashMap<PathBuf, CachedFile>,
}

#[derive(Clone)]
struct CachedFile {
    bytes: Vec<u8>,
    mtime: SystemTime,
    etag: String,
}

impl FileCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: FxHashMap::default(),
        }
    }

    /// A hit requires the on-disk mtime to still match; stale entries are
    /// evicted on access.
    fn get(&mut self, path: &Path) -> Option<CachedFile> {
        let entry = self.entries.get(path)?;
        let current = fs::metadata(path).and_then(|m| m.modified()).ok();

        if current == Some(entry.mtime) {
            return Some(entry.clone());
        }

        self.entries.remove(path);
        self.order.retain(|p| p != path);
        None
    }

    fn insert(&mut self, path: PathBuf, entry: CachedFile) {
        if self.entries.contains_key(&path) {
            self.entries.insert(path, entry);
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(path.clone());
        self.entries.insert(path, entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Look up a file through the shared cache, reading from disk on a miss.
/// A missing file is `Ok(None)`.
fn fetch(path: &Path) -> Result<Option<CachedFile>> {
    if let Some(hit) = FILE_CACHE.lock().get(path) {
        return Ok(Some(hit));
    }

    let Ok(bytes) = fs::read(path) else {
        return Ok(None);
    };
    let mtime = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", path.display()))?;

    let entry = CachedFile {
        etag: format!("\"{}\"", cache::hash_bytes(&bytes)),
        bytes,
        mtime,
    };
    FILE_CACHE.lock().insert(path.to_path_buf(), entry.clone());
    Ok(Some(entry))
}

// ============================================================================
// Content Type & Cache Policy
// ============================================================================

/// Guess MIME content type from file extension.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

/// Cache policy by asset class. Dev mode always serves `no-store` so the
/// browser re-fetches after a reload.
fn cache_control(path: &Path, dev: bool) -> &'static str {
    if dev {
        return "no-store";
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico") => {
            "public, max-age=31536000, immutable"
        }
        Some("woff" | "woff2" | "ttf" | "otf") => "public, max-age=31536000, immutable",
        Some("css" | "js" | "mjs") => "public, max-age=86400",
        _ => "public, max-age=3600",
    }
}
