//! Blake2b-256 hashing and the 32-byte identifier types derived from it.

use crate::encoding::{Decodable, Encodable, EncodingError, read_array};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

type Blake2b256 = Blake2b<U32>;

/// Streaming Blake2b-256 hasher that accepts consensus-encoded values.
#[derive(Default, Clone)]
pub struct HashWriter(Blake2b256);

impl HashWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the consensus encoding of `value` into the hasher.
    pub fn encode<T: Encodable + ?Sized>(&mut self, value: &T) -> &mut Self {
        let _ = value.consensus_encode(self);
        self
    }

    pub fn finalize(self) -> Hash256 {
        Hash256::from_digest(&self.0.finalize())
    }
}

impl Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hashes raw bytes.
pub fn hash_bytes(data: &[u8]) -> Hash256 {
    Hash256::from_digest(&Blake2b256::digest(data))
}

/// Hashes the consensus encoding of `value`.
pub fn hash_encodable<T: Encodable + ?Sized>(value: &T) -> Hash256 {
    let mut writer = HashWriter::new();
    writer.encode(value);
    writer.finalize()
}

macro_rules! define_hash_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl Encodable for $name {
            fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
                self.0.consensus_encode(writer)
            }
        }

        impl Decodable for $name {
            fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
                Ok(Self(read_array(reader)?))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

define_hash_type!(
    /// A raw Blake2b-256 digest.
    Hash256
);

impl Hash256 {
    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest);
        Self(bytes)
    }
}

define_hash_type!(
    /// Identifier of a block, the hash of its encoded header.
    BlockId
);
define_hash_type!(TransactionId);
define_hash_type!(
    /// Identifier of a coin output. Also used for delayed outputs.
    CoinOutputId
);
define_hash_type!(FundOutputId);
define_hash_type!(FileContractId);
define_hash_type!(
    /// Merkle root of a set of unlock conditions, i.e. an address.
    UnlockHash
);

define_hash_type!(
    /// Identifier of a consensus change, the hash of its reverted and applied block lists.
    ChangeId
);

macro_rules! impl_from_hash256 {
    ($($name:ident),+) => {
        $(impl From<Hash256> for $name {
            fn from(hash: Hash256) -> Self {
                Self(hash.0)
            }
        })+
    };
}

impl_from_hash256!(
    BlockId,
    TransactionId,
    CoinOutputId,
    FundOutputId,
    FileContractId,
    UnlockHash,
    ChangeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_writer_matches_one_shot() {
        let mut writer = HashWriter::new();
        writer.encode(&42u64).encode(&vec![1u8, 2, 3]);

        let mut bytes = crate::encoding::serialize(&42u64);
        bytes.extend(crate::encoding::serialize(&vec![1u8, 2, 3]));

        assert_eq!(writer.finalize(), hash_bytes(&bytes));
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        let id = BlockId::from(hash_bytes(b"turtledex"));
        let parsed: BlockId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), 64);
    }
}
