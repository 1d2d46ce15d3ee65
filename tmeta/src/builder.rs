//! Torrent construction: turn a root path (or explicit file list) into a
//! validated, hashed [`Torrent`].
//!
//! One `.generate()` entry point covers all three BEP-3/BEP-52 shapes,
//! and accepts either an explicit relative file list or derives one via
//! `accessor::list_files`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tmeta_util::SHA1_HASH_LEN;

use crate::error::{Error, Result, UsageError};
use crate::hashing::{self, HashMode, PipelineConfig, PipelineOutput, ProgressFn};
use crate::info::{FileItem, FileTree, FileTreeItem, InfoDict, InfoHybrid, InfoV1, InfoV2, PieceLen};
use crate::merkle::MerkleTree;
use crate::parse::PADFILE_ATTR_VALUE;
use crate::torrent::{Torrent, UrlList};

/// Piece length selection: a size/reliability trade-off preset, or a
/// caller-chosen value.
#[derive(Debug, Clone, Copy)]
pub enum PieceLength {
    /// Optimize for a balance between torrent file size and transfer
    /// reliability.
    OptBalanced,
    /// Optimize for torrent file size (fewer, larger pieces).
    OptFileSize,
    /// Optimize for transfer reliability (more, smaller pieces).
    OptTransfer,
    /// A caller-supplied piece length, still validated as a power of two.
    Custom(u64),
}

const BALANCED_MAX_PIECES_SIZE: u64 = 30_000;
const BALANCED_MIN_PIECE_LENGTH: u64 = 512 * 1024;

const FILE_SIZE_MAX_PIECES_SIZE: u64 = 10_000;
const FILE_SIZE_MIN_PIECE_LENGTH: u64 = 1024 * 1024;

const TRANSFER_MAX_PIECES_SIZE: u64 = 50_000;
const TRANSFER_MIN_PIECE_LENGTH: u64 = 1024;

fn determine_piece_length(total_file_size: u64, piece_length: PieceLength) -> u64 {
    match piece_length {
        PieceLength::Custom(len) => len,
        PieceLength::OptBalanced => {
            calculate_piece_length(total_file_size, BALANCED_MAX_PIECES_SIZE, BALANCED_MIN_PIECE_LENGTH)
        }
        PieceLength::OptFileSize => {
            calculate_piece_length(total_file_size, FILE_SIZE_MAX_PIECES_SIZE, FILE_SIZE_MIN_PIECE_LENGTH)
        }
        PieceLength::OptTransfer => {
            calculate_piece_length(total_file_size, TRANSFER_MAX_PIECES_SIZE, TRANSFER_MIN_PIECE_LENGTH)
        }
    }
}

/// The minimum power-of-two piece length that keeps the pieces string
/// under `max_pieces_size` bytes, floored at `min_piece_length`.
fn calculate_piece_length(total_file_size: u64, max_pieces_size: u64, min_piece_length: u64) -> u64 {
    let num_pieces = max_pieces_size as f64 / SHA1_HASH_LEN as f64;
    let piece_length = (total_file_size as f64 / num_pieces + 0.5) as u64;
    let pot_piece_length = piece_length.max(1).next_power_of_two();
    pot_piece_length.max(min_piece_length).next_power_of_two()
}

/// Which BEP-3/BEP-52 shape to hash and assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentVersion {
    V1,
    V2,
    Hybrid,
}

/// An abstract construction request: what to hash, how to cut it, and
/// the handful of cosmetic root-dict fields to set alongside it.
pub struct TorrentCreate {
    pub path_root: PathBuf,
    /// Paths relative to `path_root`. `None` means derive the list with
    /// `accessor::list_files`.
    pub files: Option<Vec<PathBuf>>,
    pub piece_length: PieceLength,
    pub trackers: Vec<Vec<String>>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub creation_date: Option<u64>,
    pub url_list: Option<UrlList>,
    pub similar: Option<Vec<[u8; 20]>>,
    pub source: Option<String>,
    pub private: Option<bool>,
}

impl TorrentCreate {
    /// Validate the request and hash the referenced files, producing a
    /// fully assembled, self-validating [`Torrent`].
    pub fn generate(
        self,
        version: TorrentVersion,
        workers: usize,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<Torrent> {
        let mut relative_paths = self.resolve_and_validate_files()?;
        match version {
            TorrentVersion::V1 => hashing::traversal::sort_v1_order(&mut relative_paths),
            TorrentVersion::V2 | TorrentVersion::Hybrid => hashing::traversal::sort_v2_order(&mut relative_paths),
        }

        let total_size: u64 = relative_paths
            .iter()
            .map(|rel| file_len(&self.path_root, rel))
            .sum();
        let piece_length = determine_piece_length(total_size, self.piece_length);

        let mode = match version {
            TorrentVersion::V1 => HashMode::V1 { piece_length },
            TorrentVersion::V2 => HashMode::V2 { piece_length },
            TorrentVersion::Hybrid => HashMode::Hybrid { piece_length },
        };
        let output = hashing::run(PipelineConfig {
            path_root: self.path_root.clone(),
            relative_paths: relative_paths.clone(),
            mode,
            workers,
            memory_limit: None,
            progress,
            cancellation: None,
        })?;

        let (info, piece_layers) = self.assemble_info(version, piece_length, &relative_paths, output)?;
        info.validate()?;

        let torrent = Torrent {
            announce: self.trackers.first().and_then(|tier| tier.first()).map(|s| s.as_bytes().to_vec()),
            announce_list: if self.trackers.len() > 1 || self.trackers.iter().any(|t| t.len() > 1) {
                Some(
                    self.trackers
                        .iter()
                        .map(|tier| tier.iter().map(|url| url.as_bytes().to_vec()).collect())
                        .collect(),
                )
            } else {
                None
            },
            comment: self.comment.map(String::into_bytes),
            created_by: self.created_by.map(String::into_bytes),
            creation_date: self.creation_date,
            info,
            piece_layers,
            url_list: self.url_list,
            similar: self.similar,
            source: self.source.map(String::into_bytes),
        };
        Ok(torrent)
    }

    fn resolve_and_validate_files(&self) -> Result<Vec<PathBuf>> {
        if self.trackers.len() > 1 && self.trackers.iter().flatten().next().is_none() {
            return Err(Error::Usage(UsageError::TrackersAndAnnounceBothSet));
        }

        let relative_paths = match &self.files {
            Some(files) => files.clone(),
            None => crate::accessor::list_files(&self.path_root),
        };
        if relative_paths.is_empty() {
            return Err(Error::Usage(UsageError::NoFiles));
        }
        for rel in &relative_paths {
            if rel.is_absolute() {
                return Err(Error::Usage(UsageError::AbsolutePathNotAllowed { path: rel.clone() }));
            }
            if rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
                return Err(Error::Usage(UsageError::PathOutsideRoot {
                    path: rel.clone(),
                    path_root: self.path_root.clone(),
                }));
            }
        }
        Ok(relative_paths)
    }

    fn v1_file_list(&self, relative_paths: &[PathBuf]) -> Vec<FileItem> {
        relative_paths.iter().map(|rel| self.plain_file_item(rel)).collect()
    }

    fn plain_file_item(&self, rel: &Path) -> FileItem {
        FileItem {
            length: file_len(&self.path_root, rel),
            path: rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned().into_bytes())
                .collect(),
            md5sum: None,
            attr: None,
        }
    }

    /// The hybrid v1 file list: a padfile entry follows every non-final
    /// file whose length doesn't already land on a piece boundary, since
    /// the hashing pipeline zero-pads and cuts a v1 piece at every file
    /// boundary (see `hashing::run_hybrid`).
    fn hybrid_file_list(&self, relative_paths: &[PathBuf], piece_length: u64) -> Vec<FileItem> {
        let mut out = Vec::with_capacity(relative_paths.len());
        for (i, rel) in relative_paths.iter().enumerate() {
            let item = self.plain_file_item(rel);
            let is_last = i + 1 == relative_paths.len();
            let remainder = item.length % piece_length;
            let needs_pad = !is_last && remainder != 0;
            let pad_length = if needs_pad { piece_length - remainder } else { 0 };
            out.push(item);
            if needs_pad {
                out.push(FileItem {
                    length: pad_length,
                    path: vec![b".pad".to_vec(), pad_length.to_string().into_bytes()],
                    md5sum: None,
                    attr: Some(PADFILE_ATTR_VALUE.to_vec()),
                });
            }
        }
        out
    }

    fn assemble_info(
        &self,
        version: TorrentVersion,
        piece_length: u64,
        relative_paths: &[PathBuf],
        output: PipelineOutput,
    ) -> Result<(InfoDict, Option<BTreeMap<[u8; 32], Vec<u8>>>)> {
        let name = root_name(&self.path_root, relative_paths);

        match version {
            TorrentVersion::V1 => {
                let pieces = output.v1_pieces.expect("v1 mode always produces v1 pieces");
                let info = InfoDict::V1(InfoV1 {
                    name,
                    piece_length: PieceLen::new_v1(piece_length)?,
                    pieces,
                    length: if relative_paths.len() == 1 {
                        Some(file_len(&self.path_root, &relative_paths[0]))
                    } else {
                        None
                    },
                    files: if relative_paths.len() == 1 { None } else { Some(self.v1_file_list(relative_paths)) },
                    private: self.private,
                });
                Ok((info, None))
            }
            TorrentVersion::V2 => {
                let trees = output.v2_file_trees.expect("v2 mode always produces file trees");
                let file_tree = build_file_tree(&self.path_root, relative_paths, &trees);
                let piece_layers = build_piece_layers(relative_paths, &trees);
                let info = InfoDict::V2(InfoV2 {
                    name,
                    piece_length: PieceLen::new_v2(piece_length)?,
                    file_tree,
                    private: self.private,
                });
                Ok((info, Some(piece_layers)))
            }
            TorrentVersion::Hybrid => {
                let trees = output.v2_file_trees.expect("hybrid mode always produces file trees");
                let pieces = output.v1_pieces.expect("hybrid mode always produces v1 pieces");
                let file_tree = build_file_tree(&self.path_root, relative_paths, &trees);
                let piece_layers = build_piece_layers(relative_paths, &trees);
                let info = InfoDict::Hybrid(InfoHybrid {
                    name,
                    piece_length: PieceLen::new_v2(piece_length)?,
                    pieces,
                    files: self.hybrid_file_list(relative_paths, piece_length),
                    file_tree,
                    private: self.private,
                });
                Ok((info, Some(piece_layers)))
            }
        }
    }
}

fn file_len(path_root: &Path, rel: &Path) -> u64 {
    std::fs::metadata(path_root.join(rel)).map(|m| m.len()).unwrap_or(0)
}

fn root_name(path_root: &Path, relative_paths: &[PathBuf]) -> Vec<u8> {
    if relative_paths.len() == 1 {
        relative_paths[0].to_string_lossy().into_owned().into_bytes()
    } else {
        path_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned().into_bytes())
            .unwrap_or_else(|| b"torrent".to_vec())
    }
}

fn build_file_tree(path_root: &Path, relative_paths: &[PathBuf], trees: &BTreeMap<PathBuf, MerkleTree>) -> FileTree {
    let mut flat = BTreeMap::new();
    for rel in relative_paths {
        let tree = &trees[rel];
        let length = file_len(path_root, rel);
        let pieces_root = if length == 0 { None } else { Some(<[u8; 32]>::from(tree.root_hash)) };
        let posix_path = crate::hashing::traversal::posix_path(rel).into_bytes();
        flat.insert(posix_path, FileTreeItem { length, pieces_root });
    }
    FileTree::unflatten(&flat)
}

/// One piece-layer entry per file whose Merkle tree has more than one
/// piece (single-piece files have no separate piece layer - their
/// `pieces root` already is the only hash there is).
fn build_piece_layers(relative_paths: &[PathBuf], trees: &BTreeMap<PathBuf, MerkleTree>) -> BTreeMap<[u8; 32], Vec<u8>> {
    let mut layers = BTreeMap::new();
    for rel in relative_paths {
        let tree = &trees[rel];
        if tree.piece_hashes.is_empty() {
            continue;
        }
        layers.insert(<[u8; 32]>::from(tree.root_hash), tree.piece_layer_bytes());
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_piece_length_is_a_power_of_two_at_or_above_the_floor() {
        let len = determine_piece_length(50 * 1024 * 1024, PieceLength::OptBalanced);
        assert!(len.is_power_of_two());
        assert!(len >= BALANCED_MIN_PIECE_LENGTH);
    }

    #[test]
    fn custom_piece_length_passes_through_unchanged() {
        assert_eq!(determine_piece_length(1_000_000, PieceLength::Custom(32 * 1024)), 32 * 1024);
    }

    fn base_create(dir: &Path) -> TorrentCreate {
        TorrentCreate {
            path_root: dir.to_path_buf(),
            files: None,
            piece_length: PieceLength::Custom(16 * 1024),
            trackers: vec![],
            comment: None,
            created_by: None,
            creation_date: None,
            url_list: None,
            similar: None,
            source: None,
            private: None,
        }
    }

    #[test]
    fn hybrid_file_list_pads_a_misaligned_non_final_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 40_000]).unwrap();
        std::fs::write(dir.path().join("b"), vec![0u8; 5_000]).unwrap();
        let create = base_create(dir.path());

        let files = create.hybrid_file_list(&[PathBuf::from("a"), PathBuf::from("b")], 16 * 1024);
        assert_eq!(files.len(), 3);
        assert!(!files[0].is_padfile());
        assert!(files[1].is_padfile());
        assert_eq!(files[0].length + files[1].length, 3 * 16 * 1024);
        assert!(!files[2].is_padfile());
    }

    #[test]
    fn hybrid_file_list_does_not_pad_an_already_aligned_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 32 * 1024]).unwrap();
        std::fs::write(dir.path().join("b"), vec![0u8; 5_000]).unwrap();
        let create = base_create(dir.path());

        let files = create.hybrid_file_list(&[PathBuf::from("a"), PathBuf::from("b")], 16 * 1024);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn hybrid_file_list_never_pads_after_the_last_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        let create = base_create(dir.path());

        let files = create.hybrid_file_list(&[PathBuf::from("a")], 16 * 1024);
        assert_eq!(files.len(), 1);
    }
}
