//! Finding the files to convert.

use std::path::{Path, PathBuf};

/// Extensions (lower case, without the dot) of the camera raw formats
/// that are accepted as input.
pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "ari", "arw", "bay", "cap", "cr2", "cr3", "crw", "dcr", "dcs", "dng", "erf", "fff",
    "iiq", "k25", "kdc", "mdc", "mef", "mos", "mrw", "nef", "nrw", "orf", "pef", "ptx", "raf",
    "raw", "rw2", "rwl", "sr2", "srf", "srw", "x3f",
];

/// Whether the path has one of the `RAW_EXTENSIONS`, ignoring case.
pub fn is_raw_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RAW_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// The supported raw formats, as ".ext" strings.
pub fn supported_raw_formats() -> Vec<String> {
    RAW_EXTENSIONS.iter().map(|ext| format!(".{}", ext)).collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Splits `paths` into files that can't be converted and raw files.
///
/// Directories are expanded (not recursively).  Hidden files, files that
/// aren't raw and paths that don't exist end up in the first list.  Both
/// lists are sorted within each directory.
pub fn collect_image_files<P: AsRef<Path>>(paths: &[P]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut skipped = Vec::new();
    let mut candidates = Vec::new();

    let mut classify = |path: PathBuf| {
        if path.is_file() && !is_hidden(&path) && is_raw_file(&path) {
            candidates.push(path);
        } else {
            skipped.push(path);
        }
    };

    for path in paths.iter().map(|p| p.as_ref()) {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = match std::fs::read_dir(path) {
                Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
                Err(e) => {
                    tracing::warn!("Failed to read directory '{}': {}", path.display(), e);
                    classify(path.to_path_buf());
                    continue;
                }
            };
            entries.sort();
            for entry in entries {
                if !entry.is_dir() {
                    classify(entry);
                }
            }
        } else {
            classify(path.to_path_buf());
        }
    }

    (skipped, candidates)
}
