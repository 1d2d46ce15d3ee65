//! Crate-wide error type. Every fallible operation in `tmeta` converges
//! here; the lower crates' error types convert in via `#[from]`.

use std::path::PathBuf;

use tmeta_bencode::DecodeError;

/// A field path used to locate where a schema violation occurred, e.g.
/// `"info.files[2].length"`.
pub type FieldPath = String;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{field}: required key is missing")]
    MissingKey { field: FieldPath },

    #[error("{field}: expected a {expected} value")]
    WrongType { field: FieldPath, expected: &'static str },

    #[error("{field}: piece count {actual} does not match ceil(total_length / piece_length) = {expected}")]
    PieceCountMismatch {
        field: FieldPath,
        expected: u64,
        actual: u64,
    },

    #[error("hybrid v1/v2 mismatch at {field}: {reason}")]
    V1V2Mismatch { field: FieldPath, reason: String },

    #[error("padfile misaligned at {field}: {reason}")]
    PadfileMisaligned { field: FieldPath, reason: String },

    #[error("{field}: file is larger than one piece but has no pieces root")]
    MissingPieceRoot { field: FieldPath },

    #[error("{field}: piece layer has {actual} bytes, expected {expected} (32 * ceil(length / piece_length))")]
    PieceLayerSizeMismatch {
        field: FieldPath,
        expected: u64,
        actual: u64,
    },

    #[error("{field}: invalid piece length {piece_length}: {reason}")]
    InvalidPieceLength {
        field: FieldPath,
        piece_length: u64,
        reason: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("{path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: file truncated mid-hash, expected {expected} bytes, read {actual}")]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("worker thread panicked while hashing {path}, index {index}")]
    Panicked { path: PathBuf, index: u64 },
    #[error("hashing worker pool disconnected unexpectedly")]
    Disconnected,
    #[error("hashing pipeline was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("both an explicit file list and pre-populated info.files were supplied")]
    FilesAndInfoBothSet,
    #[error("both `trackers` and `announce` were supplied")]
    TrackersAndAnnounceBothSet,
    #[error("path {path} escapes path_root {path_root}")]
    PathOutsideRoot { path: PathBuf, path_root: PathBuf },
    #[error("absolute path {path} given where a relative path is required")]
    AbsolutePathNotAllowed { path: PathBuf },
    #[error("no files given to construct a torrent from")]
    NoFiles,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Usage(#[from] UsageError),
}

pub type Result<T> = std::result::Result<T, Error>;
