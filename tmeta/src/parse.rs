//! Wire-key constants and the canonical alias map between schema field
//! names and bencode dictionary keys, covering the v2/hybrid keys
//! BEP-52 adds on top of BEP-3.

/// Keys found within the root dictionary of a metainfo file.
pub const ANNOUNCE_KEY: &[u8] = b"announce";
pub const ANNOUNCE_LIST_KEY: &[u8] = b"announce-list";
pub const COMMENT_KEY: &[u8] = b"comment";
pub const CREATED_BY_KEY: &[u8] = b"created by";
pub const CREATION_DATE_KEY: &[u8] = b"creation date";
pub const ENCODING_KEY: &[u8] = b"encoding";
pub const INFO_KEY: &[u8] = b"info";
pub const PIECE_LAYERS_KEY: &[u8] = b"piece layers";
pub const URL_LIST_KEY: &[u8] = b"url-list";
pub const SIMILAR_KEY: &[u8] = b"similar";
pub const SOURCE_KEY: &[u8] = b"source";

/// Keys found within the info dictionary of a metainfo file.
pub const PIECE_LENGTH_KEY: &[u8] = b"piece length";
pub const PIECES_KEY: &[u8] = b"pieces";
pub const PRIVATE_KEY: &[u8] = b"private";
pub const NAME_KEY: &[u8] = b"name";
pub const FILES_KEY: &[u8] = b"files";
pub const LENGTH_KEY: &[u8] = b"length";
pub const META_VERSION_KEY: &[u8] = b"meta version";
pub const FILE_TREE_KEY: &[u8] = b"file tree";

/// Keys found within a v1 file-list entry.
pub const MD5SUM_KEY: &[u8] = b"md5sum";
pub const PATH_KEY: &[u8] = b"path";
pub const ATTR_KEY: &[u8] = b"attr";

/// Keys found within a v2 file tree leaf.
pub const PIECES_ROOT_KEY: &[u8] = b"pieces root";

/// Value of `attr` on a v1 padfile entry.
pub const PADFILE_ATTR_VALUE: &[u8] = b"p";

/// Keys whose values must never be treated as UTF-8 text, even though
/// they live alongside stringified sibling keys in the same
/// dictionaries. Binary fidelity across these keys is what lets
/// `Torrent::bencode()` round-trip bit-exactly.
pub fn is_binary_preserve_key(key: &[u8]) -> bool {
    matches!(
        key,
        PIECES_KEY | PIECE_LAYERS_KEY | PIECES_ROOT_KEY | PATH_KEY | MD5SUM_KEY
    )
}
