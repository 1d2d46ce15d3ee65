//! The bounded-memory, worker-parallel hashing pipeline: read files in
//! traversal order, cut them into pieces/blocks, dispatch each to a
//! worker thread, and join the results back into the shapes
//! [`crate::torrent`] needs.
//!
//! Three dispatch modes share the same traversal/dispatch/reclaim loop:
//! v1 cuts one rolling piece buffer across file boundaries, v2 cuts
//! fixed 16 KiB blocks per file, and hybrid does both at once. v2 and
//! hybrid additionally run a post-pass Merkle join once every leaf hash
//! for a file is back.

pub mod buffer;
pub mod queue;
pub mod traversal;
pub mod worker;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tmeta_util::{Sha1Hash, Sha256Hash};

use crate::error::{Error, IoError, Result, WorkerError};
use crate::merkle::{MerkleTree, MerkleTreeShape, BLOCK_SIZE};
use self::buffer::PieceBuffer;
use self::queue::InFlightQueue;
use self::traversal::{sort_v1_order, sort_v2_order};
use self::worker::{HashResult, WorkItem, WorkerPool};

/// Which of the three piece layouts to run.
#[derive(Debug, Clone, Copy)]
pub enum HashMode {
    V1 { piece_length: u64 },
    V2 { piece_length: u64 },
    Hybrid { piece_length: u64 },
}

/// Raw, tagged hash output. Assembling this into `InfoV1`/`InfoV2`/
/// `InfoHybrid` (file trees, piece layers, total lengths) is left to the
/// caller in `builder.rs`; this module only hashes and orders.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub v1_pieces: Option<Vec<Sha1Hash>>,
    pub v2_file_trees: Option<BTreeMap<PathBuf, MerkleTree>>,
}

/// A cooperative cancellation flag, checked at suspension points inside
/// the pipeline, so a long-running hash can be stopped early.
#[derive(Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Cancellation {
        Cancellation(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Reports bytes hashed so far against the total, so a caller can drive
/// a progress bar.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + Send + 'a;

pub struct PipelineConfig<'a> {
    pub path_root: PathBuf,
    pub relative_paths: Vec<PathBuf>,
    pub mode: HashMode,
    pub workers: usize,
    pub memory_limit: Option<u64>,
    pub progress: Option<&'a mut ProgressFn<'a>>,
    pub cancellation: Option<Cancellation>,
}

/// Run the hashing pipeline to completion and return the raw tagged
/// hashes for whichever mode was requested.
pub fn run(config: PipelineConfig) -> Result<PipelineOutput> {
    let PipelineConfig {
        path_root,
        mut relative_paths,
        mode,
        workers,
        memory_limit,
        mut progress,
        cancellation,
    } = config;

    match mode {
        HashMode::V1 { piece_length } => {
            sort_v1_order(&mut relative_paths);
            let pieces = run_v1(
                &path_root,
                &relative_paths,
                piece_length,
                workers,
                memory_limit,
                progress.as_deref_mut(),
                cancellation.as_ref(),
            )?;
            Ok(PipelineOutput { v1_pieces: Some(pieces), v2_file_trees: None })
        }
        HashMode::V2 { piece_length } => {
            sort_v2_order(&mut relative_paths);
            let block_hashes = run_v2(
                &path_root,
                &relative_paths,
                workers,
                memory_limit,
                progress.as_deref_mut(),
                cancellation.as_ref(),
            )?;
            let trees = join_v2_trees(&path_root, &relative_paths, piece_length, block_hashes)?;
            Ok(PipelineOutput { v1_pieces: None, v2_file_trees: Some(trees) })
        }
        HashMode::Hybrid { piece_length } => {
            sort_v2_order(&mut relative_paths);
            let (v1_pieces, block_hashes) = run_hybrid(
                &path_root,
                &relative_paths,
                piece_length,
                workers,
                memory_limit,
                progress.as_deref_mut(),
                cancellation.as_ref(),
            )?;
            let trees = join_v2_trees(&path_root, &relative_paths, piece_length, block_hashes)?;
            Ok(PipelineOutput { v1_pieces: Some(v1_pieces), v2_file_trees: Some(trees) })
        }
    }
}

fn total_size(path_root: &Path, paths: &[PathBuf]) -> u64 {
    paths
        .iter()
        .map(|p| std::fs::metadata(path_root.join(p)).map(|m| m.len()).unwrap_or(0))
        .sum()
}

fn in_flight_cap(memory_limit: Option<u64>, read_size: u64, workers: usize) -> usize {
    match memory_limit {
        Some(limit) => ((limit / read_size.max(1)).max(1)) as usize,
        None => workers.max(1) * 4,
    }
}

fn open(path_root: &Path, rel: &Path) -> Result<(PathBuf, File)> {
    let abs = path_root.join(rel);
    let file = File::open(&abs).map_err(|source| IoError::Read { path: abs.clone(), source })?;
    Ok((abs, file))
}

/// Fill `buffer` from `file` with as many reads as it takes to reach a
/// whole buffer or EOF, whichever comes first. A single `read()` call
/// is not guaranteed to fill the slice it's given.
fn fill_buffer(buffer: &mut PieceBuffer, file: &mut File, path: &Path) -> Result<bool> {
    loop {
        let eof = buffer
            .read_bytes(|slice| file.read(slice))
            .map_err(|source| IoError::Read { path: path.to_path_buf(), source })?;
        if eof || buffer.is_whole() {
            return Ok(eof);
        }
    }
}

fn check_cancelled(cancellation: Option<&Cancellation>) -> Result<()> {
    if cancellation.map(|c| c.is_cancelled()).unwrap_or(false) {
        return Err(Error::Worker(WorkerError::Cancelled));
    }
    Ok(())
}

/// v1 mode: a single rolling piece buffer spans file boundaries, so a
/// piece may be made of the tail of one file and the head of the next.
fn run_v1(
    path_root: &Path,
    paths: &[PathBuf],
    piece_length: u64,
    workers: usize,
    memory_limit: Option<u64>,
    mut progress: Option<&mut ProgressFn<'_>>,
    cancellation: Option<&Cancellation>,
) -> Result<Vec<Sha1Hash>> {
    let pool = WorkerPool::start(workers, piece_length as usize);
    let mut in_flight = InFlightQueue::new(in_flight_cap(memory_limit, piece_length, workers));
    let mut completed = Vec::new();

    let total_bytes = total_size(path_root, paths);
    let mut bytes_done = 0u64;
    let mut piece_index = 0u64;
    let mut piece_buffer = pool.buffers.checkout();

    for rel in paths {
        check_cancelled(cancellation)?;
        log::debug!("v1 hashing: opening {}", rel.display());
        let (abs, mut file) = open(path_root, rel)?;
        loop {
            let eof = fill_buffer(&mut piece_buffer, &mut file, &abs)?;
            if piece_buffer.is_whole() {
                if in_flight.is_full() {
                    log::warn!("v1 hashing: in-flight cap reached, blocking on worker pool");
                }
                in_flight.wait_for_capacity(&pool.result_recv, &mut completed);
                log::trace!("v1 hashing: dispatching piece {piece_index}");
                pool.dispatch(WorkItem::V1Piece { index: piece_index, buffer: piece_buffer });
                in_flight.on_dispatch();
                piece_index += 1;
                piece_buffer = pool.buffers.checkout();
            }
            if eof {
                break;
            }
        }
        bytes_done += std::fs::metadata(&abs).map(|m| m.len()).unwrap_or(0);
        if let Some(cb) = progress.as_deref_mut() {
            cb(bytes_done, total_bytes);
        }
        in_flight.poll(&pool.result_recv, &mut completed);
    }

    if !piece_buffer.is_empty() {
        in_flight.wait_for_capacity(&pool.result_recv, &mut completed);
        pool.dispatch(WorkItem::V1Piece { index: piece_index, buffer: piece_buffer });
        in_flight.on_dispatch();
    }

    in_flight.drain_all(&pool.result_recv, &mut completed);
    log::debug!("v1 hashing: shutting down worker pool after {piece_index} pieces");
    pool.shutdown()?;

    let mut pieces: Vec<(u64, Sha1Hash)> = completed
        .into_iter()
        .filter_map(|r| match r {
            HashResult::V1Piece { index, hash } => Some((index, hash)),
            _ => None,
        })
        .collect();
    pieces.sort_by_key(|(index, _)| *index);
    Ok(pieces.into_iter().map(|(_, hash)| hash).collect())
}

/// v2 mode: every file is cut into its own run of 16 KiB blocks,
/// independent of any other file.
fn run_v2(
    path_root: &Path,
    paths: &[PathBuf],
    workers: usize,
    memory_limit: Option<u64>,
    mut progress: Option<&mut ProgressFn<'_>>,
    cancellation: Option<&Cancellation>,
) -> Result<BTreeMap<PathBuf, Vec<Sha256Hash>>> {
    let pool = WorkerPool::start(workers, BLOCK_SIZE as usize);
    let mut in_flight = InFlightQueue::new(in_flight_cap(memory_limit, BLOCK_SIZE, workers));
    let mut completed = Vec::new();

    let total_bytes = total_size(path_root, paths);
    let mut bytes_done = 0u64;

    for rel in paths {
        check_cancelled(cancellation)?;
        log::debug!("v2 hashing: opening {}", rel.display());
        let (abs, mut file) = open(path_root, rel)?;
        let mut block_index = 0u64;
        loop {
            let mut buffer = pool.buffers.checkout();
            let eof = fill_buffer(&mut buffer, &mut file, &abs)?;
            if buffer.is_empty() {
                pool.buffers.checkin(buffer);
                break;
            }
            if in_flight.is_full() {
                log::warn!("v2 hashing: in-flight cap reached, blocking on worker pool");
            }
            in_flight.wait_for_capacity(&pool.result_recv, &mut completed);
            pool.dispatch(WorkItem::V2Block { path: rel.clone(), index: block_index, buffer });
            in_flight.on_dispatch();
            block_index += 1;
            if eof {
                break;
            }
        }
        bytes_done += std::fs::metadata(&abs).map(|m| m.len()).unwrap_or(0);
        if let Some(cb) = progress.as_deref_mut() {
            cb(bytes_done, total_bytes);
        }
        in_flight.poll(&pool.result_recv, &mut completed);
    }

    in_flight.drain_all(&pool.result_recv, &mut completed);
    log::debug!("v2 hashing: shutting down worker pool");
    pool.shutdown()?;

    Ok(group_v2_blocks(completed))
}

/// Hybrid mode: blocks are read once per file and dispatched for their
/// v2 block hash; the same bytes are copied into a second, piece-sized
/// buffer that is cut and dispatched for its v1 piece hash whenever it
/// fills, or zero-padded and cut early at a file boundary.
fn run_hybrid(
    path_root: &Path,
    paths: &[PathBuf],
    piece_length: u64,
    workers: usize,
    memory_limit: Option<u64>,
    mut progress: Option<&mut ProgressFn<'_>>,
    cancellation: Option<&Cancellation>,
) -> Result<(Vec<Sha1Hash>, BTreeMap<PathBuf, Vec<Sha256Hash>>)> {
    let v2_pool = WorkerPool::start(workers, BLOCK_SIZE as usize);
    let v1_pool = WorkerPool::start(workers, piece_length as usize);
    let mut v2_in_flight = InFlightQueue::new(in_flight_cap(memory_limit, BLOCK_SIZE, workers));
    let mut v1_in_flight = InFlightQueue::new(in_flight_cap(memory_limit, piece_length, workers));
    let mut v2_completed = Vec::new();
    let mut v1_completed = Vec::new();

    let total_bytes = total_size(path_root, paths);
    let mut bytes_done = 0u64;
    let mut v1_index = 0u64;
    let mut piece_buffer = v1_pool.buffers.checkout();

    for rel in paths {
        check_cancelled(cancellation)?;
        log::debug!("hybrid hashing: opening {}", rel.display());
        let (abs, mut file) = open(path_root, rel)?;
        let mut block_index = 0u64;
        loop {
            let mut block_buffer = v2_pool.buffers.checkout();
            let eof = fill_buffer(&mut block_buffer, &mut file, &abs)?;
            if block_buffer.is_empty() {
                v2_pool.buffers.checkin(block_buffer);
                break;
            }
            let block_bytes = block_buffer.as_slice().to_vec();

            v2_in_flight.wait_for_capacity(&v2_pool.result_recv, &mut v2_completed);
            v2_pool.dispatch(WorkItem::V2Block { path: rel.clone(), index: block_index, buffer: block_buffer });
            v2_in_flight.on_dispatch();
            block_index += 1;

            piece_buffer
                .read_bytes(|slice| {
                    let n = block_bytes.len().min(slice.len());
                    slice[..n].copy_from_slice(&block_bytes[..n]);
                    Ok(n)
                })
                .expect("copy from an in-memory slice cannot fail");

            if piece_buffer.is_whole() {
                v1_in_flight.wait_for_capacity(&v1_pool.result_recv, &mut v1_completed);
                v1_pool.dispatch(WorkItem::HybridPiece { path: rel.clone(), index: v1_index, buffer: piece_buffer });
                v1_in_flight.on_dispatch();
                v1_index += 1;
                piece_buffer = v1_pool.buffers.checkout();
            }
            if eof {
                break;
            }
        }

        // Flush a short final piece now, zero-padded: a file boundary
        // always cuts a piece, so the next file's bytes never bleed
        // into this file's last piece.
        if !piece_buffer.is_empty() {
            piece_buffer.zero_pad_to_whole();
            v1_in_flight.wait_for_capacity(&v1_pool.result_recv, &mut v1_completed);
            v1_pool.dispatch(WorkItem::HybridPiece { path: rel.clone(), index: v1_index, buffer: piece_buffer });
            v1_in_flight.on_dispatch();
            v1_index += 1;
            piece_buffer = v1_pool.buffers.checkout();
        }

        bytes_done += std::fs::metadata(&abs).map(|m| m.len()).unwrap_or(0);
        if let Some(cb) = progress.as_deref_mut() {
            cb(bytes_done, total_bytes);
        }
        v2_in_flight.poll(&v2_pool.result_recv, &mut v2_completed);
        v1_in_flight.poll(&v1_pool.result_recv, &mut v1_completed);
    }

    v2_in_flight.drain_all(&v2_pool.result_recv, &mut v2_completed);
    v1_in_flight.drain_all(&v1_pool.result_recv, &mut v1_completed);
    v2_pool.shutdown()?;
    v1_pool.shutdown()?;

    let mut v1_pairs: Vec<(u64, Sha1Hash)> = v1_completed
        .into_iter()
        .filter_map(|r| match r {
            HashResult::HybridPiece { index, hash, .. } => Some((index, hash)),
            _ => None,
        })
        .collect();
    v1_pairs.sort_by_key(|(index, _)| *index);
    let v1_pieces = v1_pairs.into_iter().map(|(_, hash)| hash).collect();

    Ok((v1_pieces, group_v2_blocks(v2_completed)))
}

fn group_v2_blocks(completed: Vec<HashResult>) -> BTreeMap<PathBuf, Vec<Sha256Hash>> {
    let mut by_path: BTreeMap<PathBuf, Vec<(u64, Sha256Hash)>> = BTreeMap::new();
    for result in completed {
        if let HashResult::V2Block { path, index, hash } = result {
            by_path.entry(path).or_default().push((index, hash));
        }
    }
    let mut out = BTreeMap::new();
    for (path, mut blocks) in by_path {
        blocks.sort_by_key(|(index, _)| *index);
        out.insert(path, blocks.into_iter().map(|(_, hash)| hash).collect());
    }
    out
}

/// Build each file's Merkle tree from its ordered block hashes. The
/// worker pool only ever produces leaf hashes; assembling them into a
/// tree happens here, once a file's full set of blocks is back.
fn join_v2_trees(
    path_root: &Path,
    paths: &[PathBuf],
    piece_length: u64,
    mut block_hashes: BTreeMap<PathBuf, Vec<Sha256Hash>>,
) -> Result<BTreeMap<PathBuf, MerkleTree>> {
    let mut trees = BTreeMap::new();
    for rel in paths {
        let leaves = block_hashes.remove(rel).unwrap_or_default();
        let length = std::fs::metadata(path_root.join(rel))
            .map(|m| m.len())
            .map_err(|source| IoError::Read { path: path_root.join(rel), source })?;
        let shape = MerkleTreeShape::new(length, piece_length);
        let tree = MerkleTree::from_leaf_hashes_with_shape(leaves, shape);
        trees.insert(rel.clone(), tree);
    }
    Ok(trees)
}
