//! Filesystem access kept separate from the hashing pipeline itself: a
//! thin, directly-testable collaborator for turning a root path into
//! the relative file list the rest of `tmeta` works from.
//!
//! Walks the tree with `walkdir` and filters through the same exclusion
//! list the hashing pipeline's traversal order uses.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::hashing::traversal::is_excluded;

/// List every regular file under `path`, relative to `path`, in
/// arbitrary filesystem order (callers sort with
/// `hashing::traversal::sort_v1_order`/`sort_v2_order` as needed).
/// `.DS_Store`/`Thumbs.db` are never returned.
pub fn list_files(path: &Path) -> Vec<PathBuf> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .filter(|abs| !is_excluded(abs))
        .filter_map(|abs| abs.strip_prefix(path).map(|rel| rel.to_path_buf()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_nested_files_relative_to_root_and_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();
        fs::write(dir.path().join(".DS_Store"), b"noise").unwrap();

        let mut files = list_files(dir.path());
        files.sort();
        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("sub/b.txt")]);
    }
}
