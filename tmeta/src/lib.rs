//! Read, validate, construct, and write BitTorrent v1/v2/hybrid
//! metainfo (`.torrent`) files.
//!
//! `InfoDict` unifies the v1/v2/hybrid info-dict shapes, and
//! `tmeta::Error` converges the lower crates' error types into one type
//! tree.

pub mod accessor;
pub mod builder;
pub mod error;
pub mod hashing;
pub mod info;
pub mod merkle;
pub mod parse;
pub mod torrent;
mod util;

pub use builder::{PieceLength, TorrentCreate, TorrentVersion};
pub use error::{Error, IoError, Result, SchemaError, UsageError, WorkerError};
pub use hashing::{Cancellation, HashMode, PipelineConfig, PipelineOutput};
pub use info::{FileItem, FileTree, FileTreeItem, FileTreeNode, InfoDict, InfoHybrid, InfoV1, InfoV2, PadfileMode, PieceLen};
pub use merkle::{MerkleTree, MerkleTreeShape, BLOCK_SIZE};
pub use torrent::{Torrent, UrlList};
