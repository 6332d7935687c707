// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input discovery: which files in a folder become thumbnails, and in what
// order.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use gridsheet_core::types::ImageKind;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Image files directly inside `dir`, sorted by file name.
///
/// A directory that cannot be read is logged and treated as empty.
pub fn scan_folder(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "cannot read folder, skipping");
            return Vec::new();
        }
    };

    // `Path::is_file` follows symlinks, so linked images are kept.
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_candidate(path))
        .collect();

    sort_by_file_name(&mut files);
    debug!(dir = %dir.display(), count = files.len(), "scanned folder");
    files
}

/// Image files anywhere under `dir`, skipping hidden directories, sorted by
/// file name across the whole tree.
///
/// Symlinked files are included; symlinked directories are not descended
/// into.
pub fn scan_tree(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let location = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!(path = %location, error = %err, "cannot read directory entry, skipping");
                continue;
            }
        };

        if is_regular_or_linked_file(&entry) && is_candidate(entry.path()) {
            files.push(entry.into_path());
        }
    }

    sort_by_file_name(&mut files);
    debug!(dir = %dir.display(), count = files.len(), "scanned tree");
    files
}

/// Keep the paths of an explicit file list that look like images, in the
/// order given.
pub fn filter_supported<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(Into::into)
        .filter(|path| {
            let keep = is_candidate(path);
            if !keep {
                debug!(path = %path.display(), "not an image, ignored");
            }
            keep
        })
        .collect()
}

/// Non-hidden file with a decodable or RAW extension.
fn is_candidate(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !hidden && ImageKind::from_path(path).is_some()
}

fn is_regular_or_linked_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Case-insensitive sort on the file name alone; the directory is ignored.
pub fn sort_by_file_name(files: &mut [PathBuf]) {
    files.sort_by(|a, b| compare_file_names(a, b));
}

fn compare_file_names(a: &Path, b: &Path) -> Ordering {
    let key = |path: &Path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    };
    key(a).cmp(&key(b))
}
