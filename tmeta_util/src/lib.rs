//! Hash newtypes shared by the bencode, metainfo, and hashing pipeline
//! crates.

pub mod error;
pub mod sha;

pub use error::{LengthError, LengthResult};
pub use sha::{Sha1Hash, Sha256Hash, SHA1_HASH_LEN, SHA256_HASH_LEN};
