use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::normalize_extension;

/// List the files directly inside `folder` whose extension is in `extensions`.
///
/// Extensions are compared case-insensitively and without the leading dot, so
/// `IMG_0001.ARW` matches `"arw"`. Subdirectories are not descended into.
/// Files come back in filesystem-listing order.
///
/// Fails only when `folder` itself cannot be read; unreadable entries are
/// logged and skipped.
///
/// # Example
///
/// ```rust,no_run
/// use bracket_hdr::scan::collect_files;
/// use std::path::Path;
///
/// let raws = collect_files(Path::new("./shoot"), &["arw".to_string(), "nef".to_string()])?;
/// println!("Found {} RAW files", raws.len());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn collect_files(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        anyhow::bail!("Not a directory: {}", folder.display());
    }
    // Surface permission problems on the folder itself as a hard error.
    std::fs::read_dir(folder)
        .with_context(|| format!("Failed to read directory {}", folder.display()))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", folder.display());
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Check if a file's extension is one of `extensions`.
///
/// Both sides are normalized, so `".ARW"`, `"arw"` and `"Arw"` all match.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|e| normalize_extension(e) == ext)
        })
        .unwrap_or(false)
}
