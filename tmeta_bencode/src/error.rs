//! Errors produced while decoding bencoded data.

/// All of the ways a byte slice can fail to decode as a well-formed
/// bencoded value.
///
/// Every variant carries the byte offset at which the problem was
/// detected so that callers can point at the offending region of a
/// (possibly very large) torrent file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {pos}")]
    UnexpectedEof { pos: usize },

    #[error("invalid integer at byte {pos}: {reason}")]
    InvalidInteger { pos: usize, reason: &'static str },

    #[error("invalid string length at byte {pos}: {reason}")]
    InvalidLength { pos: usize, reason: &'static str },

    #[error("dictionary key at byte {pos} is out of ascending order")]
    UnorderedDictKeys { pos: usize },

    #[error("duplicate dictionary key at byte {pos}")]
    DuplicateDictKey { pos: usize },

    #[error("{len} trailing byte(s) after the top-level value, starting at byte {pos}")]
    Trailing { pos: usize, len: usize },

    #[error("bencode nesting exceeded the maximum depth of {max} at byte {pos}")]
    NestingTooDeep { pos: usize, max: usize },

    #[error("unrecognized bencode tag byte {byte:#04x} at byte {pos}")]
    InvalidByte { pos: usize, byte: u8 },
}

/// Result alias used throughout the decoder.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors produced while pulling a typed value out of a [`crate::BencodeValue`].
///
/// These are distinct from [`DecodeError`]: decoding is about whether the
/// byte stream is well-formed bencode at all, while conversion is about
/// whether a successfully-decoded value has the shape a caller expected
/// (e.g. "I expected a dictionary here, but found an integer").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("expected a {expected} value for key {key:?}, found something else")]
    WrongType {
        key: Vec<u8>,
        expected: &'static str,
    },
    #[error("missing required key {key:?}")]
    MissingKey { key: Vec<u8> },
}

pub type ConvertResult<T> = Result<T, ConvertError>;
