//! The two canonical traversal orders the hashing pipeline reads files
//! in, and the filesystem-noise exclusion list.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Filenames skipped by [`crate::accessor::list_files`] and never hashed.
pub const EXCLUDE_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

pub fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| EXCLUDE_FILES.contains(&name))
        .unwrap_or(false)
}

/// Join path components with `/`, regardless of host path separator.
pub fn posix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// v1 order: top-level files first, then directory-nested files, each
/// group sorted case-insensitively by POSIX path.
pub fn sort_v1_order(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        let a_top = a.components().count() <= 1;
        let b_top = b.components().count() <= 1;
        match (a_top, b_top) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => posix_path(a).to_lowercase().cmp(&posix_path(b).to_lowercase()),
        }
    });
}

/// v2/hybrid order: lexicographic by POSIX path.
pub fn sort_v2_order(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| posix_path(a).cmp(&posix_path(b)));
}
