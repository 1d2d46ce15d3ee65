//! The worker pool that hashes dispatched pieces/blocks.
//!
//! Three task kinds share one pool: whole v1 pieces, single v2 blocks,
//! and per-file hybrid pieces. There is no separate master thread
//! relaying messages between caller and workers - the pipeline driver
//! in `hashing::mod` dispatches onto and polls a plain
//! `crossbeam_channel` MPMC pair directly.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tmeta_util::{Sha1Hash, Sha256Hash};

use super::buffer::{PieceBuffer, PieceBuffers};
use crate::error::WorkerError;

/// A unit of hashing work, tagged with everything the driver needs to
/// reassemble results in order once they come back (possibly) out of
/// order.
pub enum WorkItem {
    /// A whole v1 piece, built from a contiguous run of bytes that may
    /// span multiple files.
    V1Piece { index: u64, buffer: PieceBuffer },
    /// A single 16 KiB v2 Merkle leaf, within one file.
    V2Block { path: PathBuf, index: u64, buffer: PieceBuffer },
    /// A whole piece cut within a single file's blocks, for the v1 view
    /// of a hybrid torrent.
    HybridPiece { path: PathBuf, index: u64, buffer: PieceBuffer },
}

enum WorkerMessage {
    Work(WorkItem),
    Shutdown,
}

/// A completed hash, tagged the same way its [`WorkItem`] was.
pub enum HashResult {
    V1Piece { index: u64, hash: Sha1Hash },
    V2Block { path: PathBuf, index: u64, hash: Sha256Hash },
    HybridPiece { path: PathBuf, index: u64, hash: Sha1Hash },
}

/// A running pool of hasher threads plus the buffer pool they share with
/// the driver.
pub struct WorkerPool {
    work_send: Sender<WorkerMessage>,
    pub result_recv: Receiver<HashResult>,
    pub buffers: PieceBuffers,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `num_workers` hasher threads, each pulling from a shared
    /// work queue and pushing results to a shared result queue.
    /// `buffer_len` is the fixed size of buffers handed to workers
    /// (`piece_length` for v1, `BLOCK_SIZE` for v2/hybrid blocks - a
    /// hybrid pipeline runs two pools, one per buffer size).
    pub fn start(num_workers: usize, buffer_len: usize) -> WorkerPool {
        let (work_send, work_recv) = unbounded::<WorkerMessage>();
        let (result_send, result_recv) = unbounded::<HashResult>();
        let buffers = PieceBuffers::new(buffer_len, num_workers.max(1));

        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers.max(1) {
            let work_recv = work_recv.clone();
            let result_send = result_send.clone();
            let buffers = buffers.clone();
            handles.push(thread::spawn(move || run_worker(work_recv, result_send, buffers)));
        }

        WorkerPool {
            work_send,
            result_recv,
            buffers,
            handles,
        }
    }

    pub fn dispatch(&self, item: WorkItem) {
        // An unbounded channel never blocks here; the pipeline driver
        // enforces the actual backpressure bound via `InFlightQueue`
        // before calling this.
        let _ = self.work_send.send(WorkerMessage::Work(item));
    }

    /// Signal every worker to exit once its queue drains, then join them.
    pub fn shutdown(self) -> Result<(), WorkerError> {
        for _ in &self.handles {
            let _ = self.work_send.send(WorkerMessage::Shutdown);
        }
        for handle in self.handles {
            handle.join().map_err(|_| WorkerError::Disconnected)?;
        }
        Ok(())
    }
}

fn run_worker(work_recv: Receiver<WorkerMessage>, result_send: Sender<HashResult>, buffers: PieceBuffers) {
    for message in work_recv.iter() {
        match message {
            WorkerMessage::Shutdown => break,
            WorkerMessage::Work(WorkItem::V1Piece { index, buffer }) => {
                let hash = Sha1Hash::from_bytes(buffer.as_slice());
                buffers.checkin(buffer);
                let _ = result_send.send(HashResult::V1Piece { index, hash });
            }
            WorkerMessage::Work(WorkItem::V2Block { path, index, buffer }) => {
                let hash = Sha256Hash::from_bytes(buffer.as_slice());
                buffers.checkin(buffer);
                let _ = result_send.send(HashResult::V2Block { path, index, hash });
            }
            WorkerMessage::Work(WorkItem::HybridPiece { path, index, buffer }) => {
                let hash = Sha1Hash::from_bytes(buffer.as_slice());
                buffers.checkin(buffer);
                let _ = result_send.send(HashResult::HybridPiece { path, index, hash });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_a_single_v1_piece() {
        let pool = WorkerPool::start(2, 8);
        let mut buffer = pool.buffers.checkout();
        buffer.read_bytes(|slice| { slice.copy_from_slice(b"abcdefgh"); Ok(8) }).unwrap();
        pool.dispatch(WorkItem::V1Piece { index: 0, buffer });

        let result = pool.result_recv.recv().unwrap();
        match result {
            HashResult::V1Piece { index, hash } => {
                assert_eq!(index, 0);
                assert_eq!(hash, Sha1Hash::from_bytes(b"abcdefgh"));
            }
            _ => panic!("expected a V1Piece result"),
        }
        pool.shutdown().unwrap();
    }

    #[test]
    fn hashes_many_v2_blocks_across_workers() {
        let pool = WorkerPool::start(4, 4);
        for i in 0..20u64 {
            let mut buffer = pool.buffers.checkout();
            let bytes = [i as u8; 4];
            buffer.read_bytes(|slice| { slice.copy_from_slice(&bytes); Ok(4) }).unwrap();
            pool.dispatch(WorkItem::V2Block {
                path: PathBuf::from("f"),
                index: i,
                buffer,
            });
        }
        let mut seen = 0;
        while seen < 20 {
            if let Ok(HashResult::V2Block { .. }) = pool.result_recv.recv() {
                seen += 1;
            }
        }
        pool.shutdown().unwrap();
    }
}
