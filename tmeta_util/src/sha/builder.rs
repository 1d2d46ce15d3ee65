use digest::Digest as _;
use sha1::Sha1;
use sha2::Sha256;

use crate::sha::{Sha1Hash, Sha256Hash, SHA1_HASH_LEN, SHA256_HASH_LEN};

macro_rules! sha_hash_builder {
    ($name:ident, $digest:ty, $hash:ident, $len:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Default)]
        pub struct $name {
            digest: $digest,
        }

        impl $name {
            pub fn new() -> $name {
                $name {
                    digest: <$digest>::default(),
                }
            }

            /// Feed more bytes into the running hash.
            pub fn add_bytes(mut self, bytes: &[u8]) -> $name {
                self.digest.update(bytes);
                self
            }

            /// Finalize the hash without consuming the builder.
            pub fn build(&self) -> $hash {
                let digest = self.digest.clone().finalize();
                let mut buf = [0u8; $len];
                buf.copy_from_slice(&digest);
                buf.into()
            }
        }
    };
}

sha_hash_builder!(
    Sha1HashBuilder,
    Sha1,
    Sha1Hash,
    SHA1_HASH_LEN,
    "Incrementally build a [`Sha1Hash`] from successive byte slices."
);
sha_hash_builder!(
    Sha256HashBuilder,
    Sha256,
    Sha256Hash,
    SHA256_HASH_LEN,
    "Incrementally build a [`Sha256Hash`] from successive byte slices."
);
