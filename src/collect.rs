//! File discovery and deduplication.
//!
//! Walks an optional directory and appends any explicitly named files,
//! resolving each to its canonical path. Two spellings of the same file
//! (relative vs absolute, symlink vs target) collapse to the first one seen.
//! Only metadata is touched here; file contents are read at upload time.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CollectConfig;
use crate::error::{IngestError, Result};
use crate::models::FileRef;

/// Collect the files to upload, in a stable order and without duplicates.
///
/// Directory entries come first, sorted lexicographically by path, followed
/// by `explicit_files` in the order given.
///
/// # Errors
///
/// [`IngestError::InvalidInput`] when the directory is missing or not a
/// directory, an explicit path is not a regular file, or nothing is selected.
pub fn collect_files(
    directory: Option<&Path>,
    explicit_files: &[PathBuf],
    config: &CollectConfig,
) -> Result<Vec<FileRef>> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(root) = directory {
        if !root.is_dir() {
            return Err(IngestError::InvalidInput(format!(
                "--dir must be a directory: {}",
                root.display()
            )));
        }
        candidates.extend(walk_directory(root, config)?);
    }

    for path in explicit_files {
        if !path.is_file() {
            return Err(IngestError::InvalidInput(format!(
                "--file must be a file: {}",
                path.display()
            )));
        }
        candidates.push(path.clone());
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::with_capacity(candidates.len());
    for path in candidates {
        let canonical = path
            .canonicalize()
            .map_err(|e| IngestError::io(&path, e))?;
        if !seen.insert(canonical.clone()) {
            tracing::debug!(path = %path.display(), "skipping duplicate file");
            continue;
        }
        files.push(FileRef {
            display_name: display_name(&path, &canonical),
            path: canonical,
        });
    }

    if files.is_empty() {
        return Err(IngestError::InvalidInput(
            "no files selected: provide at least one --file or a --dir".to_string(),
        ));
    }

    tracing::info!(count = files.len(), "collected files");
    Ok(files)
}

fn walk_directory(root: &Path, config: &CollectConfig) -> Result<Vec<PathBuf>> {
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            IngestError::io(path, e.into())
        })?;
        // `follow_links` only governs recursion into linked directories;
        // a link to a regular file is always collected.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    // Full-path order, so `a/z.txt` sorts before `b.txt`.
    paths.sort();
    Ok(paths)
}

fn display_name(original: &Path, canonical: &Path) -> String {
    original
        .file_name()
        .or_else(|| canonical.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| canonical.display().to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            IngestError::InvalidInput(format!("bad exclude glob '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IngestError::InvalidInput(format!("bad exclude globs: {}", e)))
}
