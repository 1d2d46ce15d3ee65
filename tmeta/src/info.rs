//! The typed metainfo schema: file lists, the v2 file tree, and the
//! `InfoDict` variants (v1 / v2 / hybrid), with their cross-field
//! validators.

use std::collections::BTreeMap;

use tmeta_util::Sha1Hash;

use crate::error::SchemaError;
use crate::merkle::BLOCK_SIZE;
use crate::parse::PADFILE_ATTR_VALUE;

/// A single path component, preserved as raw bytes: path components are
/// one of the keys the schema never stringifies, so that a round-tripped
/// torrent is bit-exact even for non-UTF-8 filenames.
pub type PathComponent = Vec<u8>;

/// A v1 file-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileItem {
    pub length: u64,
    pub path: Vec<PathComponent>,
    pub md5sum: Option<Vec<u8>>,
    pub attr: Option<Vec<u8>>,
}

impl FileItem {
    pub fn is_padfile(&self) -> bool {
        self.attr.as_deref() == Some(PADFILE_ATTR_VALUE)
    }

    pub fn posix_path(&self) -> Vec<u8> {
        join_path_components(&self.path)
    }
}

/// A v2 file tree leaf: a file's length and the root of its per-file
/// Merkle tree (absent only for zero-length files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTreeItem {
    pub length: u64,
    pub pieces_root: Option<[u8; 32]>,
}

/// One node of the v2 file tree: either a regular subdirectory, or a
/// leaf describing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTreeNode {
    Dir(BTreeMap<PathComponent, FileTreeNode>),
    File(FileTreeItem),
}

/// The v2 nested file tree. The wire form nests dictionaries keyed by
/// path component, with a leaf represented as `{"": {...}}`; that wire
/// shape is handled at the bencode boundary in `torrent.rs`. Here the
/// tree is a plain recursive map, easier to build and walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileTree(pub BTreeMap<PathComponent, FileTreeNode>);

impl FileTree {
    /// Flatten into an ordered mapping from joined POSIX path to leaf,
    /// in ascending byte order of the joined path (this is also the
    /// canonical v2 traversal order).
    pub fn flatten(&self) -> BTreeMap<Vec<u8>, FileTreeItem> {
        let mut out = BTreeMap::new();
        let mut prefix = Vec::new();
        flatten_into(&self.0, &mut prefix, &mut out);
        out
    }

    /// Rebuild a tree from a flattened mapping of joined POSIX paths.
    pub fn unflatten(flat: &BTreeMap<Vec<u8>, FileTreeItem>) -> FileTree {
        let mut root: BTreeMap<PathComponent, FileTreeNode> = BTreeMap::new();
        for (path, item) in flat {
            let components: Vec<&[u8]> = path.split(|&b| b == b'/').collect();
            insert_component(&mut root, &components, item.clone());
        }
        FileTree(root)
    }
}

fn flatten_into(
    node: &BTreeMap<PathComponent, FileTreeNode>,
    prefix: &mut Vec<PathComponent>,
    out: &mut BTreeMap<Vec<u8>, FileTreeItem>,
) {
    for (name, child) in node {
        prefix.push(name.clone());
        match child {
            FileTreeNode::File(item) => {
                out.insert(join_path_components(prefix), item.clone());
            }
            FileTreeNode::Dir(children) => flatten_into(children, prefix, out),
        }
        prefix.pop();
    }
}

fn insert_component(root: &mut BTreeMap<PathComponent, FileTreeNode>, components: &[&[u8]], item: FileTreeItem) {
    let (head, rest) = components
        .split_first()
        .expect("path must have at least one component");

    if rest.is_empty() {
        root.insert(head.to_vec(), FileTreeNode::File(item));
        return;
    }

    let entry = root
        .entry(head.to_vec())
        .or_insert_with(|| FileTreeNode::Dir(BTreeMap::new()));
    match entry {
        FileTreeNode::Dir(children) => insert_component(children, rest, item),
        FileTreeNode::File(_) => {
            *entry = FileTreeNode::Dir(BTreeMap::new());
            if let FileTreeNode::Dir(children) = entry {
                insert_component(children, rest, item);
            }
        }
    }
}

pub fn join_path_components(components: &[PathComponent]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(component);
    }
    out
}

/// A validated `piece length` value. v1 requires a power of two; v2 (and
/// hybrid) additionally require it be at least `BLOCK_SIZE` and a
/// multiple of `BLOCK_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceLen(u64);

impl PieceLen {
    pub fn new_v1(value: u64) -> Result<PieceLen, SchemaError> {
        if value == 0 || !is_power_of_two(value) {
            return Err(SchemaError::InvalidPieceLength {
                field: "info.piece length".into(),
                piece_length: value,
                reason: "must be a power of two",
            });
        }
        Ok(PieceLen(value))
    }

    pub fn new_v2(value: u64) -> Result<PieceLen, SchemaError> {
        if value == 0 || !is_power_of_two(value) {
            return Err(SchemaError::InvalidPieceLength {
                field: "info.piece length".into(),
                piece_length: value,
                reason: "must be a power of two",
            });
        }
        if value < BLOCK_SIZE {
            return Err(SchemaError::InvalidPieceLength {
                field: "info.piece length".into(),
                piece_length: value,
                reason: "must be at least 16 KiB",
            });
        }
        if value % BLOCK_SIZE != 0 {
            return Err(SchemaError::InvalidPieceLength {
                field: "info.piece length".into(),
                piece_length: value,
                reason: "must be a multiple of 16 KiB",
            });
        }
        Ok(PieceLen(value))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// How strictly padfile placement in a v1 file list is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadfileMode {
    /// Adjacent (file, padfile) pairs must sum to a piece-length
    /// multiple, but a misaligned file need not be followed by one.
    Default,
    /// Every non-final misaligned file must be followed by a padfile.
    /// Hybrid torrents always use this mode.
    Strict,
    /// A padfile is never accepted.
    Forbid,
    /// Padfile alignment is not checked at all.
    Ignore,
}

/// Validate padfile placement in a v1 file list.
pub fn validate_padfiles(files: &[FileItem], piece_length: u64, mode: PadfileMode) -> Result<(), SchemaError> {
    if mode == PadfileMode::Ignore {
        return Ok(());
    }
    if mode == PadfileMode::Forbid {
        if files.iter().any(FileItem::is_padfile) {
            return Err(SchemaError::PadfileMisaligned {
                field: "info.files".into(),
                reason: "padfiles are forbidden in this mode".into(),
            });
        }
        return Ok(());
    }

    for (i, file) in files.iter().enumerate() {
        if file.is_padfile() {
            continue;
        }
        let is_last = i + 1 == files.len();
        let next_is_pad = !is_last && files[i + 1].is_padfile();

        if next_is_pad {
            let sum = file.length + files[i + 1].length;
            if sum % piece_length != 0 {
                return Err(SchemaError::PadfileMisaligned {
                    field: format!("info.files[{i}]"),
                    reason: "file + padfile length is not a multiple of piece_length".into(),
                });
            }
        } else if mode == PadfileMode::Strict && !is_last && file.length % piece_length != 0 {
            return Err(SchemaError::PadfileMisaligned {
                field: format!("info.files[{i}]"),
                reason: "non-final misaligned file is not followed by a padfile".into(),
            });
        }
    }

    Ok(())
}

/// The v1-only infodict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoV1 {
    pub name: Vec<u8>,
    pub piece_length: PieceLen,
    pub pieces: Vec<Sha1Hash>,
    /// Exactly one of `length`/`files` is populated.
    pub length: Option<u64>,
    pub files: Option<Vec<FileItem>>,
    pub private: Option<bool>,
}

impl InfoV1 {
    pub fn total_length(&self) -> u64 {
        match (&self.length, &self.files) {
            (Some(len), None) => *len,
            (None, Some(files)) => files.iter().map(|f| f.length).sum(),
            _ => 0,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        match (&self.length, &self.files) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::V1V2Mismatch {
                    field: "info".into(),
                    reason: "both `length` and `files` are present".into(),
                })
            }
            (None, None) => {
                return Err(SchemaError::MissingKey {
                    field: "info.length|info.files".into(),
                })
            }
            _ => {}
        }

        let expected = crate::util::ceil_div(self.total_length(), self.piece_length.get());
        if self.pieces.len() as u64 != expected {
            return Err(SchemaError::PieceCountMismatch {
                field: "info.pieces".into(),
                expected,
                actual: self.pieces.len() as u64,
            });
        }

        Ok(())
    }
}

/// The v2-only infodict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoV2 {
    pub name: Vec<u8>,
    pub piece_length: PieceLen,
    pub file_tree: FileTree,
    pub private: Option<bool>,
}

impl InfoV2 {
    pub const META_VERSION: u64 = 2;

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_file_tree_piece_roots(&self.file_tree, self.piece_length.get())
    }
}

/// Both v1 and v2 metadata describing the same content in the same
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoHybrid {
    pub name: Vec<u8>,
    pub piece_length: PieceLen,
    pub pieces: Vec<Sha1Hash>,
    pub files: Vec<FileItem>,
    pub file_tree: FileTree,
    pub private: Option<bool>,
}

impl InfoHybrid {
    pub const META_VERSION: u64 = 2;

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_file_tree_piece_roots(&self.file_tree, self.piece_length.get())?;
        validate_padfiles(&self.files, self.piece_length.get(), PadfileMode::Strict)?;
        validate_v1_v2_consistency(&self.files, &self.file_tree)?;

        let padded_total: u64 = self.files.iter().map(|f| f.length).sum();
        let expected = crate::util::ceil_div(padded_total, self.piece_length.get());
        if self.pieces.len() as u64 != expected {
            return Err(SchemaError::PieceCountMismatch {
                field: "info.pieces".into(),
                expected,
                actual: self.pieces.len() as u64,
            });
        }
        Ok(())
    }
}

fn validate_file_tree_piece_roots(file_tree: &FileTree, piece_length: u64) -> Result<(), SchemaError> {
    for (path, item) in file_tree.flatten() {
        let field = format!("file_tree[{}]", String::from_utf8_lossy(&path));
        if item.length == 0 {
            continue;
        }
        if item.length > piece_length && item.pieces_root.is_none() {
            return Err(SchemaError::MissingPieceRoot { field });
        }
    }
    Ok(())
}

/// With padfiles removed, the v1 `files` list and the flattened
/// `file_tree` must agree on count, order, path, and length.
fn validate_v1_v2_consistency(files: &[FileItem], file_tree: &FileTree) -> Result<(), SchemaError> {
    let flattened = file_tree.flatten();
    let real_files: Vec<&FileItem> = files.iter().filter(|f| !f.is_padfile()).collect();

    if real_files.len() != flattened.len() {
        return Err(SchemaError::V1V2Mismatch {
            field: "info.files".into(),
            reason: format!(
                "{} non-padfile v1 entries but {} v2 file tree leaves",
                real_files.len(),
                flattened.len()
            ),
        });
    }

    for (file, (path, item)) in real_files.iter().zip(flattened.iter()) {
        let posix_path = file.posix_path();
        if posix_path != *path {
            return Err(SchemaError::V1V2Mismatch {
                field: "info.files".into(),
                reason: format!(
                    "v1 path {:?} does not match v2 path {:?} at the same position",
                    String::from_utf8_lossy(&posix_path),
                    String::from_utf8_lossy(path)
                ),
            });
        }
        if file.length != item.length {
            return Err(SchemaError::V1V2Mismatch {
                field: "info.files".into(),
                reason: format!("length mismatch for {:?}", String::from_utf8_lossy(path)),
            });
        }
    }

    Ok(())
}

/// The top-level infodict, tagged by which BEP-3/BEP-52 fields are
/// present. Discrimination is by key presence only (`pieces` vs
/// `file tree`); there is no virtual dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoDict {
    V1(InfoV1),
    V2(InfoV2),
    Hybrid(InfoHybrid),
}

impl InfoDict {
    pub fn name(&self) -> &[u8] {
        match self {
            InfoDict::V1(info) => &info.name,
            InfoDict::V2(info) => &info.name,
            InfoDict::Hybrid(info) => &info.name,
        }
    }

    pub fn piece_length(&self) -> u64 {
        match self {
            InfoDict::V1(info) => info.piece_length.get(),
            InfoDict::V2(info) => info.piece_length.get(),
            InfoDict::Hybrid(info) => info.piece_length.get(),
        }
    }

    pub fn private(&self) -> Option<bool> {
        match self {
            InfoDict::V1(info) => info.private,
            InfoDict::V2(info) => info.private,
            InfoDict::Hybrid(info) => info.private,
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        match self {
            InfoDict::V1(info) => info.validate(),
            InfoDict::V2(info) => info.validate(),
            InfoDict::Hybrid(info) => info.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &[&str], length: u64) -> FileItem {
        FileItem {
            length,
            path: path.iter().map(|s| s.as_bytes().to_vec()).collect(),
            md5sum: None,
            attr: None,
        }
    }

    fn pad(length: u64) -> FileItem {
        FileItem {
            length,
            path: vec![b".pad".to_vec(), length.to_string().into_bytes()],
            md5sum: None,
            attr: Some(PADFILE_ATTR_VALUE.to_vec()),
        }
    }

    #[test]
    fn piece_len_v1_accepts_power_of_two() {
        assert!(PieceLen::new_v1(16 * 1024).is_ok());
        assert!(PieceLen::new_v1(3).is_err());
    }

    #[test]
    fn piece_len_v2_rejects_small_and_non_multiple() {
        assert!(PieceLen::new_v2(8 * 1024).is_err());
        assert!(PieceLen::new_v2(16 * 1024).is_ok());
    }

    #[test]
    fn file_tree_flatten_unflatten_round_trips() {
        let mut flat = BTreeMap::new();
        flat.insert(
            b"a/b.txt".to_vec(),
            FileTreeItem {
                length: 10,
                pieces_root: None,
            },
        );
        flat.insert(
            b"c.txt".to_vec(),
            FileTreeItem {
                length: 20,
                pieces_root: Some([1u8; 32]),
            },
        );

        let tree = FileTree::unflatten(&flat);
        assert_eq!(tree.flatten(), flat);
    }

    #[test]
    fn default_padfile_mode_allows_unpadded_misaligned_final_file() {
        let files = vec![item(&["a"], 100)];
        assert!(validate_padfiles(&files, 16 * 1024, PadfileMode::Default).is_ok());
    }

    #[test]
    fn strict_padfile_mode_requires_padding_after_misaligned_non_final_file() {
        let files = vec![item(&["a"], 100), item(&["b"], 300)];
        assert!(validate_padfiles(&files, 16 * 1024, PadfileMode::Strict).is_err());
    }

    #[test]
    fn strict_padfile_mode_accepts_correctly_padded_pair() {
        let files = vec![item(&["a"], 100), pad(16284), item(&["b"], 300)];
        assert!(validate_padfiles(&files, 16 * 1024, PadfileMode::Strict).is_ok());
    }

    #[test]
    fn forbid_mode_rejects_any_padfile() {
        let files = vec![item(&["a"], 100), pad(16284)];
        assert!(validate_padfiles(&files, 16 * 1024, PadfileMode::Forbid).is_err());
    }
}
