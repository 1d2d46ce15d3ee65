use std::fmt;

use crate::error::{LengthError, LengthResult};

mod builder;

pub use self::builder::{Sha1HashBuilder, Sha256HashBuilder};

/// Length in bytes of a SHA-1 hash.
pub const SHA1_HASH_LEN: usize = 20;

/// Length in bytes of a SHA-256 hash.
pub const SHA256_HASH_LEN: usize = 32;

macro_rules! sha_hash_type {
    ($name:ident, $len:ident, $builder:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            hash: [u8; $len],
        }

        impl $name {
            /// Hash `bytes` in one shot.
            pub fn from_bytes(bytes: &[u8]) -> $name {
                $builder::new().add_bytes(bytes).build()
            }

            /// Wrap an already-computed hash, checking its length.
            pub fn from_hash(hash: &[u8]) -> LengthResult<$name> {
                if hash.len() != $len {
                    return Err(LengthError {
                        expected: $len,
                        actual: hash.len(),
                    });
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(hash);
                Ok($name { hash: buf })
            }

            pub const fn len() -> usize {
                $len
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.hash
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(hash: [u8; $len]) -> $name {
                $name { hash }
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(value: $name) -> [u8; $len] {
                value.hash
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in &self.hash {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, ")")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.hash {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    };
}

sha_hash_type!(
    Sha1Hash,
    SHA1_HASH_LEN,
    Sha1HashBuilder,
    "A SHA-1 hash, as used for v1 piece hashes and v1 infohashes."
);
sha_hash_type!(
    Sha256Hash,
    SHA256_HASH_LEN,
    Sha256HashBuilder,
    "A SHA-256 hash, as used for v2 block hashes, Merkle nodes, and v2 infohashes."
);
