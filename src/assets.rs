//! Static asset processing.
//!
//! Non-image assets are copied verbatim. Image-family assets go through the
//! transcode boundary (`image bytes → encoded bytes`), gated by their own
//! hash cache and processed in fixed-width batches to bound memory and file
//! descriptors. A transcode failure falls back to copying the original
//! unmodified; an I/O failure aborts the pass.

use crate::{
    cache::{self, BuildCache},
    config::SitePaths,
    log,
};
use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, ImageFormat, ImageReader};
use rayon::prelude::*;
use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Concurrent transcode operations per batch
const IMAGE_BATCH: usize = 5;

/// Extensions routed through the transcoder
const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// JPEG re-encode quality
const JPEG_QUALITY: u8 = 85;

/// Copy the static tree into the output directory.
///
/// Returns the number of files written. `image_cache` entries are recorded
/// for every image seen this pass (skipped or not) so the persisted snapshot
/// stays complete.
pub fn process_static(paths: &SitePaths, image_cache: &mut BuildCache, full: bool) -> Result<usize> {
    if !paths.statics.exists() {
        return Ok(0);
    }

    let mut plain = Vec::new();
    let mut images = Vec::new();

    for entry in WalkDir::new(&paths.statics).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if is_image(&path) {
            images.push(path);
        } else {
            plain.push(path);
        }
    }
    images.sort();

    for path in &plain {
        let dest = dest_for(path, paths)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &dest)
            .with_context(|| format!("Failed to copy {}", path.display()))?;
    }

    let count = plain.len() + process_images(&images, paths, image_cache, full)?;
    Ok(count)
}

/// Transcode changed images in batches of [`IMAGE_BATCH`]; a batch completes
/// before the next starts.
fn process_images(
    images: &[PathBuf],
    paths: &SitePaths,
    image_cache: &mut BuildCache,
    full: bool,
) -> Result<usize> {
    let mut pending = Vec::new();

    for path in images {
        let hash = cache::hash_file(path)?;
        let dest = dest_for(path, paths)?;
        if full || !dest.exists() || image_cache.should_rebuild(path, &hash, false) {
            pending.push((path.clone(), dest));
        }
        image_cache.record(path, hash);
    }

    for batch in pending.chunks(IMAGE_BATCH) {
        batch
            .par_iter()
            .try_for_each(|(source, dest)| write_image(source, dest))?;
    }

    Ok(pending.len())
}

/// Transcode one image into the output tree, copying the original bytes on
/// transcode failure.
fn write_image(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let bytes =
        fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;

    let output = match transcode(&bytes) {
        Ok(encoded) => encoded,
        Err(err) => {
            log!("warn"; "transcode {} failed ({err:#}), copying original", source.display());
            bytes
        }
    };

    fs::write(dest, output).with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(())
}

/// Pure transcode boundary: re-encode image bytes in their own format.
fn transcode(bytes: &[u8]) -> Result<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format().context("unknown image format")?;
    let img = reader.decode()?;

    let mut out = Vec::with_capacity(bytes.len());
    match format {
        ImageFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&img)?;
        }
        _ => img.write_to(&mut Cursor::new(&mut out), format)?,
    }
    Ok(out)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn dest_for(path: &Path, paths: &SitePaths) -> Result<PathBuf> {
    let rel = path
        .strip_prefix(&paths.statics)
        .with_context(|| format!("{} not under static root", path.display()))?;
    Ok(paths.output.join(rel))
}
