//! The in-flight task count and the backpressure rule: poll
//! non-blockingly while there's room, block on the result channel once
//! the in-flight count reaches the cap.
//!
//! Tracks an explicit counter against `memory_limit / read_size` using
//! `crossbeam_channel`'s `try_recv`/`recv`.

use crossbeam_channel::{Receiver, TryRecvError};

use super::worker::HashResult;

/// Tracks how many dispatched tasks have not yet been reclaimed, and
/// implements the non-blocking-poll / blocking-when-full rule.
pub struct InFlightQueue {
    in_flight: usize,
    cap: usize,
}

impl InFlightQueue {
    pub fn new(cap: usize) -> InFlightQueue {
        InFlightQueue { in_flight: 0, cap: cap.max(1) }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_full(&self) -> bool {
        self.in_flight >= self.cap
    }

    pub fn on_dispatch(&mut self) {
        self.in_flight += 1;
    }

    /// Drain whatever results are already available, without blocking.
    pub fn poll(&mut self, results: &Receiver<HashResult>, into: &mut Vec<HashResult>) {
        loop {
            match results.try_recv() {
                Ok(result) => {
                    self.in_flight -= 1;
                    into.push(result);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Block on the queue head until the in-flight count drops back
    /// under the cap. This is the backpressure suspension point.
    pub fn wait_for_capacity(&mut self, results: &Receiver<HashResult>, into: &mut Vec<HashResult>) {
        while self.is_full() {
            match results.recv() {
                Ok(result) => {
                    self.in_flight -= 1;
                    into.push(result);
                }
                Err(_) => break,
            }
        }
    }

    /// Block until every in-flight task has been reclaimed.
    pub fn drain_all(&mut self, results: &Receiver<HashResult>, into: &mut Vec<HashResult>) {
        while self.in_flight > 0 {
            match results.recv() {
                Ok(result) => {
                    self.in_flight -= 1;
                    into.push(result);
                }
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use tmeta_util::Sha1Hash;

    #[test]
    fn poll_drains_available_results_without_blocking() {
        let (send, recv) = unbounded();
        let mut queue = InFlightQueue::new(4);
        queue.on_dispatch();
        send.send(HashResult::V1Piece { index: 0, hash: Sha1Hash::from_bytes(b"x") }).unwrap();

        let mut into = Vec::new();
        queue.poll(&recv, &mut into);
        assert_eq!(into.len(), 1);
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn becomes_full_at_cap_and_drains_on_wait() {
        let (send, recv) = unbounded();
        let mut queue = InFlightQueue::new(2);
        queue.on_dispatch();
        queue.on_dispatch();
        assert!(queue.is_full());

        send.send(HashResult::V1Piece { index: 0, hash: Sha1Hash::from_bytes(b"x") }).unwrap();
        send.send(HashResult::V1Piece { index: 1, hash: Sha1Hash::from_bytes(b"y") }).unwrap();

        let mut into = Vec::new();
        queue.wait_for_capacity(&recv, &mut into);
        assert!(!queue.is_full());
        assert_eq!(into.len(), 1);
    }
}
