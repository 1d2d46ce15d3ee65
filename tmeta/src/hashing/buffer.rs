//! A reusable pool of fixed-capacity byte buffers, so the pipeline
//! doesn't allocate a new buffer per piece/block.
//!
//! The pool is backed by a bounded `crossbeam_channel`, so checkout and
//! checkin are both lock-free and block a caller only when the pool is
//! genuinely exhausted.

use crossbeam_channel::{bounded, Receiver, Sender};

const TOTAL_BUFFERS_MULTIPLICATIVE: usize = 2;
const TOTAL_BUFFERS_ADDITIVE: usize = 4;

/// A pool of same-sized [`PieceBuffer`]s that workers check out and back
/// in, so the number of live allocations stays bounded by worker count
/// rather than by the number of pieces processed. Cheaply `Clone`,
/// since it only owns a pair of channel endpoints - each worker thread
/// holds its own handle to the same underlying pool.
#[derive(Clone)]
pub struct PieceBuffers {
    capacity: usize,
    recv: Receiver<PieceBuffer>,
    send: Sender<PieceBuffer>,
}

impl PieceBuffers {
    pub fn new(buffer_len: usize, num_workers: usize) -> PieceBuffers {
        let total = calculate_total_buffers(num_workers);
        let (send, recv) = bounded(total);
        for _ in 0..total {
            send.send(PieceBuffer::new(buffer_len)).expect("channel just created, cannot be full or disconnected");
        }
        PieceBuffers { capacity: buffer_len, recv, send }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return a buffer to the pool for reuse.
    pub fn checkin(&self, mut buffer: PieceBuffer) {
        buffer.bytes_read = 0;
        let _ = self.send.send(buffer);
    }

    /// Check out a buffer, blocking if every buffer is currently in use.
    pub fn checkout(&self) -> PieceBuffer {
        self.recv.recv().expect("piece buffer pool disconnected")
    }
}

fn calculate_total_buffers(num_workers: usize) -> usize {
    num_workers * TOTAL_BUFFERS_MULTIPLICATIVE + TOTAL_BUFFERS_ADDITIVE
}

/// A fixed-capacity buffer that fills up to a whole piece or block
/// before being handed off for hashing.
pub struct PieceBuffer {
    buffer: Vec<u8>,
    bytes_read: usize,
}

impl PieceBuffer {
    fn new(len: usize) -> PieceBuffer {
        PieceBuffer {
            buffer: vec![0u8; len],
            bytes_read: 0,
        }
    }

    /// Feed the unread tail of the buffer to `read_bytes`, returning
    /// whether the read hit EOF (zero bytes read).
    pub fn read_bytes<F>(&mut self, mut read_bytes: F) -> std::io::Result<bool>
    where
        F: FnMut(&mut [u8]) -> std::io::Result<usize>,
    {
        let slice = &mut self.buffer[self.bytes_read..];
        let n = read_bytes(slice)?;
        self.bytes_read += n;
        Ok(n == 0)
    }

    pub fn is_whole(&self) -> bool {
        self.bytes_read == self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_read == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.bytes_read]
    }

    /// Zero-fill the remaining capacity and mark the buffer whole. Used
    /// at a hybrid file boundary to pad a partial piece up to
    /// `piece_length` before cutting it.
    pub fn zero_pad_to_whole(&mut self) {
        let start = self.bytes_read;
        for byte in &mut self.buffer[start..] {
            *byte = 0;
        }
        self.bytes_read = self.buffer.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fills_up_over_multiple_reads() {
        let mut buffer = PieceBuffers::new(8, 1).checkout();
        let mut source = Cursor::new(vec![1u8, 2, 3, 4, 5, 6, 7, 8]);
        let eof = buffer.read_bytes(|slice| std::io::Read::read(&mut source, slice)).unwrap();
        assert!(buffer.is_whole());
        assert!(!eof);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn zero_pad_to_whole_fills_remaining_capacity() {
        let mut buffer = PieceBuffers::new(4, 1).checkout();
        let mut source = Cursor::new(vec![9u8]);
        buffer.read_bytes(|slice| std::io::Read::read(&mut source, &mut slice[..1])).unwrap();
        buffer.zero_pad_to_whole();
        assert!(buffer.is_whole());
        assert_eq!(buffer.as_slice(), &[9, 0, 0, 0]);
    }

    #[test]
    fn checkin_resets_for_reuse() {
        let pool = PieceBuffers::new(4, 1);
        let mut buffer = pool.checkout();
        buffer.zero_pad_to_whole();
        pool.checkin(buffer);
        let reused = pool.checkout();
        assert!(reused.is_empty());
    }
}
