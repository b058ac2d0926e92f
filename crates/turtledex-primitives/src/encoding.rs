//! Deterministic binary encoding used for object IDs and for everything persisted
//! in the ledger store.
//!
//! The format is deliberately rigid: integers are 8-byte little-endian, variable
//! length collections carry an 8-byte little-endian length prefix, and fixed-size
//! byte arrays (hashes, specifiers, nonces) are written raw. Structs encode their
//! fields in declaration order. Two nodes encoding the same value always produce
//! the same bytes.

use std::io::{self, Read, Write};

/// Upper bound on the number of elements a decoded collection may claim.
pub const MAX_COLLECTION_LEN: u64 = 1 << 24;

/// Encoding error.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Collection length {0} exceeds the maximum of {MAX_COLLECTION_LEN}")]
    OversizedCollection(u64),
    #[error("Invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),
    #[error("Currency magnitude of {0} bytes does not fit in 128 bits")]
    CurrencyOverflow(u64),
    #[error("Currency has a non-minimal encoding")]
    NonMinimalCurrency,
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),
    #[error("Storage key has unexpected length {0}")]
    InvalidKeyLength(usize),
    #[error("Invalid arbitrary data: {0}")]
    InvalidArbitraryData(&'static str),
}

/// Data which can be encoded in the consensus format.
pub trait Encodable {
    /// Writes `self` to `writer`, returning the number of bytes written.
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize>;
}

/// Data which can be decoded from the consensus format.
pub trait Decodable: Sized {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError>;
}

/// Encodes `value` into a freshly allocated buffer.
pub fn serialize<T: Encodable + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value
        .consensus_encode(&mut buf)
        .expect("Writing into a Vec never fails; qed");
    buf
}

/// Decodes a value from `bytes`, rejecting any trailing data.
pub fn deserialize<T: Decodable>(bytes: &[u8]) -> Result<T, EncodingError> {
    let mut cursor = bytes;
    let value = T::consensus_decode(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(EncodingError::TrailingBytes(cursor.len()));
    }
    Ok(value)
}

/// Encoded length of `value` in bytes.
pub fn encoded_len<T: Encodable + ?Sized>(value: &T) -> usize {
    struct Counter(usize);

    impl Write for Counter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0 += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut counter = Counter(0);
    let _ = value.consensus_encode(&mut counter);
    counter.0
}

pub(crate) fn read_array<R: Read + ?Sized, const N: usize>(
    reader: &mut R,
) -> Result<[u8; N], EncodingError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a collection length prefix and checks it against [`MAX_COLLECTION_LEN`].
pub(crate) fn read_len<R: Read + ?Sized>(reader: &mut R) -> Result<usize, EncodingError> {
    let len = u64::consensus_decode(reader)?;
    if len > MAX_COLLECTION_LEN {
        return Err(EncodingError::OversizedCollection(len));
    }
    Ok(len as usize)
}

impl Encodable for u64 {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(&self.to_le_bytes())?;
        Ok(8)
    }
}

impl Decodable for u64 {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        Ok(u64::from_le_bytes(read_array(reader)?))
    }
}

impl Encodable for u8 {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(&[*self])?;
        Ok(1)
    }
}

impl Decodable for u8 {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        let [byte] = read_array::<_, 1>(reader)?;
        Ok(byte)
    }
}

impl Encodable for bool {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        u8::from(*self).consensus_encode(writer)
    }
}

impl Decodable for bool {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        match u8::consensus_decode(reader)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(EncodingError::InvalidBool(other)),
        }
    }
}

impl<const N: usize> Encodable for [u8; N] {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self)?;
        Ok(N)
    }
}

impl<const N: usize> Decodable for [u8; N] {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        read_array(reader)
    }
}

impl<T: Encodable> Encodable for [T] {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut len = (self.len() as u64).consensus_encode(writer)?;
        for item in self {
            len += item.consensus_encode(writer)?;
        }
        Ok(len)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        self.as_slice().consensus_encode(writer)
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        let len = read_len(reader)?;
        // Grow as we go, a hostile length prefix must not trigger a huge allocation.
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::consensus_decode(reader)?);
        }
        Ok(items)
    }
}

impl<T: Encodable> Encodable for Option<T> {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        match self {
            Some(value) => Ok(true.consensus_encode(writer)? + value.consensus_encode(writer)?),
            None => false.consensus_encode(writer),
        }
    }
}

impl<T: Decodable> Decodable for Option<T> {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        if bool::consensus_decode(reader)? {
            Ok(Some(T::consensus_decode(reader)?))
        } else {
            Ok(None)
        }
    }
}

/// Implements [`Encodable`] and [`Decodable`] for a struct by encoding its fields in
/// the listed order.
#[macro_export]
macro_rules! impl_consensus_encoding {
    ($type:ident, $($field:ident),+ $(,)?) => {
        impl $crate::encoding::Encodable for $type {
            fn consensus_encode<W: std::io::Write + ?Sized>(
                &self,
                writer: &mut W,
            ) -> std::io::Result<usize> {
                let mut len = 0;
                $(len += $crate::encoding::Encodable::consensus_encode(&self.$field, writer)?;)+
                Ok(len)
            }
        }

        impl $crate::encoding::Decodable for $type {
            fn consensus_decode<R: std::io::Read + ?Sized>(
                reader: &mut R,
            ) -> Result<Self, $crate::encoding::EncodingError> {
                Ok($type {
                    $($field: $crate::encoding::Decodable::consensus_decode(reader)?),+
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_layout() {
        assert_eq!(serialize(&0x0102u64), vec![2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(serialize(&true), vec![1]);
        assert_eq!(
            serialize(&vec![7u8, 8]),
            vec![2, 0, 0, 0, 0, 0, 0, 0, 7, 8]
        );
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = serialize(&5u64);
        bytes.push(0);
        assert!(matches!(
            deserialize::<u64>(&bytes),
            Err(EncodingError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_rejects_invalid_bool() {
        assert!(matches!(
            deserialize::<bool>(&[2]),
            Err(EncodingError::InvalidBool(2))
        ));
    }

    #[test]
    fn test_rejects_oversized_collection() {
        let bytes = serialize(&(MAX_COLLECTION_LEN + 1));
        assert!(matches!(
            deserialize::<Vec<u8>>(&bytes),
            Err(EncodingError::OversizedCollection(_))
        ));
    }

    #[test]
    fn test_encoded_len_matches_serialize() {
        let value = vec![vec![1u8, 2, 3], vec![]];
        assert_eq!(encoded_len(&value), serialize(&value).len());
    }
}
