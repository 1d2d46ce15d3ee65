//! The v2 Merkle tree engine: padding arithmetic and piece-layer/root-hash
//! derivation.
//!
//! Pure arithmetic and hashing, no I/O. Padding is computed explicitly
//! rather than relied on as a side effect (see `n_pad_blocks`'s doc
//! comment for the already-piece-aligned case).

use tmeta_util::Sha256Hash;

/// Size of a single Merkle leaf / v2 hash block.
pub const BLOCK_SIZE: u64 = 16 * 1024;

/// The shape of the Merkle tree for a file of a given length and piece
/// length: how many real leaves/pieces there are, and how much padding
/// is required to balance the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleTreeShape {
    pub piece_length: u64,
    /// Blocks per piece (`Q` in the padding law).
    pub blocks_per_piece: u64,
    pub n_blocks: u64,
    pub n_pieces: u64,
    pub n_pad_blocks: u64,
    pub n_pad_pieces: u64,
}

impl MerkleTreeShape {
    /// Compute the shape for a file of `length` bytes under `piece_length`.
    ///
    /// `piece_length` must already be validated as a power of two,
    /// `>= BLOCK_SIZE`, and a multiple of `BLOCK_SIZE` (the caller -
    /// `InfoV2`/`InfoHybrid` validation - is responsible for that; this
    /// function does not re-check it).
    pub fn new(length: u64, piece_length: u64) -> MerkleTreeShape {
        let blocks_per_piece = piece_length / BLOCK_SIZE;
        let n_blocks = ceil_div(length, BLOCK_SIZE);
        let n_pieces = if length < piece_length {
            0
        } else {
            ceil_div(length, piece_length)
        };

        let (n_pad_blocks, n_pad_pieces) = if n_pieces <= 1 {
            let padded_total = next_pow2(n_blocks.max(1));
            (padded_total - n_blocks, 0)
        } else {
            // Padding only within the last piece here: an unguarded
            // `Q - n_blocks % Q` hands an already-aligned file a full
            // spurious padding piece instead of zero.
            let n_pad_blocks = (blocks_per_piece - (n_blocks % blocks_per_piece)) % blocks_per_piece;
            let padded_pieces = next_pow2(n_pieces);
            (n_pad_blocks, padded_pieces - n_pieces)
        };

        MerkleTreeShape {
            piece_length,
            blocks_per_piece,
            n_blocks,
            n_pieces,
            n_pad_blocks,
            n_pad_pieces,
        }
    }
}

fn ceil_div(n: u64, d: u64) -> u64 {
    if n == 0 {
        0
    } else {
        (n + d - 1) / d
    }
}

fn next_pow2(n: u64) -> u64 {
    if n <= 1 {
        1
    } else {
        1u64 << (64 - (n - 1).leading_zeros())
    }
}

fn zero_leaf() -> Sha256Hash {
    Sha256Hash::from([0u8; 32])
}

/// Hash a single 16 KiB (or shorter, for the final real block) leaf.
pub fn hash_leaf(block: &[u8]) -> Sha256Hash {
    Sha256Hash::from_bytes(block)
}

fn hash_pair(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(left.as_ref());
    buf.extend_from_slice(right.as_ref());
    Sha256Hash::from_bytes(&buf)
}

/// Fold a power-of-two-length slice of leaves into a single root by
/// repeated pairwise hashing.
fn merkle_root(mut level: Vec<Sha256Hash>) -> Sha256Hash {
    assert!(!level.is_empty(), "merkle_root requires at least one leaf");
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// A computed per-file Merkle tree: the piece layer (one subtree root
/// per piece, empty for single-piece files) and the overall root hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    pub shape: MerkleTreeShape,
    pub piece_hashes: Vec<Sha256Hash>,
    pub root_hash: Sha256Hash,
}

impl MerkleTree {
    /// Build the tree from the real (unpadded) leaf hashes of a file, in
    /// file-offset order, given the shape computed from the file's
    /// actual length (deriving length back from a block count would be
    /// lossy for the final, possibly-short, block).
    pub fn from_leaf_hashes_with_shape(leaf_hashes: Vec<Sha256Hash>, shape: MerkleTreeShape) -> MerkleTree {
        debug_assert_eq!(leaf_hashes.len() as u64, shape.n_blocks);

        if shape.n_pieces <= 1 {
            let mut leaves = leaf_hashes;
            leaves.extend(std::iter::repeat(zero_leaf()).take(shape.n_pad_blocks as usize));
            let root_hash = merkle_root(leaves);
            return MerkleTree {
                shape,
                piece_hashes: Vec::new(),
                root_hash,
            };
        }

        let q = shape.blocks_per_piece as usize;
        let mut piece_hashes = Vec::with_capacity(shape.n_pieces as usize);
        for piece_leaves in leaf_hashes.chunks(q) {
            let mut padded = piece_leaves.to_vec();
            padded.resize(q, zero_leaf());
            piece_hashes.push(merkle_root(padded));
        }

        let pad_piece_hash = merkle_root(vec![zero_leaf(); q]);
        let mut top = piece_hashes.clone();
        top.extend(std::iter::repeat(pad_piece_hash).take(shape.n_pad_pieces as usize));
        let root_hash = merkle_root(top);

        MerkleTree {
            shape,
            piece_hashes,
            root_hash,
        }
    }

    /// The piece layer as it is stored in `Torrent.piece_layers`: the
    /// concatenation of each piece's subtree root.
    pub fn piece_layer_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.piece_hashes.len() * 32);
        for hash in &self.piece_hashes {
            out.extend_from_slice(hash.as_ref());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_small_file_pads_to_next_power_of_two() {
        let shape = MerkleTreeShape::new(100, 16 * 1024);
        assert_eq!(shape.n_blocks, 1);
        assert_eq!(shape.n_pieces, 0);
        assert_eq!(shape.n_pad_blocks, 0);
        assert_eq!(shape.n_pad_pieces, 0);
    }

    #[test]
    fn shape_exact_one_block() {
        let shape = MerkleTreeShape::new(16 * 1024, 16 * 1024);
        assert_eq!(shape.n_blocks, 1);
        assert_eq!(shape.n_pieces, 1);
        assert_eq!(shape.n_pad_blocks, 0);
        assert_eq!(shape.n_pad_pieces, 0);
    }

    #[test]
    fn shape_40kb_file_32kb_piece() {
        let shape = MerkleTreeShape::new(40 * 1024, 32 * 1024);
        assert_eq!(shape.blocks_per_piece, 2);
        assert_eq!(shape.n_blocks, 3);
        assert_eq!(shape.n_pad_blocks, 1);
        assert_eq!(shape.n_pieces, 2);
        assert_eq!(shape.n_pad_pieces, 0);
    }

    #[test]
    fn shape_already_aligned_multi_piece_file_has_no_pad_blocks() {
        // 64 KiB file, 32 KiB pieces: exactly 2 pieces, 4 blocks, no
        // padding needed at all. The unguarded `Q - n_blocks % Q` form
        // would wrongly compute a full extra padding piece here.
        let shape = MerkleTreeShape::new(64 * 1024, 32 * 1024);
        assert_eq!(shape.n_blocks, 4);
        assert_eq!(shape.n_pad_blocks, 0);
        assert_eq!(shape.n_pieces, 2);
        assert_eq!(shape.n_pad_pieces, 0);
    }

    #[test]
    fn padding_law_holds_for_multi_piece_shape() {
        let shape = MerkleTreeShape::new(40 * 1024, 32 * 1024);
        assert_eq!((shape.n_blocks + shape.n_pad_blocks) % shape.blocks_per_piece, 0);
        assert_eq!(is_power_of_two(shape.n_pieces + shape.n_pad_pieces), true);
    }

    #[test]
    fn padding_law_holds_for_single_piece_shape() {
        let shape = MerkleTreeShape::new(100, 16 * 1024);
        assert!(is_power_of_two(shape.n_blocks + shape.n_pad_blocks));
    }

    fn is_power_of_two(n: u64) -> bool {
        n != 0 && (n & (n - 1)) == 0
    }

    #[test]
    fn single_block_root_is_leaf_padded_to_itself() {
        let shape = MerkleTreeShape::new(100, 16 * 1024);
        let leaf = hash_leaf(b"hello");
        let tree = MerkleTree::from_leaf_hashes_with_shape(vec![leaf], shape);
        assert_eq!(tree.root_hash, leaf);
        assert!(tree.piece_hashes.is_empty());
    }

    #[test]
    fn exact_piece_root_has_no_piece_layer_and_matches_the_leaf_hash() {
        let shape = MerkleTreeShape::new(16 * 1024, 16 * 1024);
        let leaf = hash_leaf(&vec![7u8; 16 * 1024]);
        let tree = MerkleTree::from_leaf_hashes_with_shape(vec![leaf], shape);
        assert!(tree.piece_hashes.is_empty());
        assert_eq!(tree.root_hash, leaf);
    }

    #[test]
    fn forty_kb_file_produces_expected_piece_layer_shape() {
        let shape = MerkleTreeShape::new(40 * 1024, 32 * 1024);
        let leaves = vec![
            hash_leaf(&vec![1u8; 16 * 1024]),
            hash_leaf(&vec![2u8; 16 * 1024]),
            hash_leaf(&vec![3u8; 8 * 1024]),
        ];
        let tree = MerkleTree::from_leaf_hashes_with_shape(leaves, shape);
        assert_eq!(tree.piece_hashes.len(), 2);
        assert_eq!(tree.piece_layer_bytes().len(), 64);
    }
}
