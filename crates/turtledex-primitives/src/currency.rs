use crate::encoding::{Decodable, Encodable, EncodingError, read_len};
use std::fmt;
use std::io::{self, Read, Write};

/// An amount of coins in base units, or a count of fund units.
///
/// All arithmetic is checked; consensus code treats an overflow as an invalid
/// transaction rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency(u128);

impl Currency {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }

    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        self.0.checked_div(rhs.0).map(Self)
    }

    /// Sums an iterator of amounts, returning `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(iter: I) -> Option<Self> {
        iter.into_iter()
            .try_fold(Self::ZERO, |acc, value| acc.checked_add(value))
    }
}

impl From<u64> for Currency {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Length-prefixed minimal big-endian magnitude; zero has an empty magnitude.
impl Encodable for Currency {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let bytes = self.0.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        let magnitude = &bytes[skip..];
        let len = (magnitude.len() as u64).consensus_encode(writer)?;
        writer.write_all(magnitude)?;
        Ok(len + magnitude.len())
    }
}

impl Decodable for Currency {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        let len = read_len(reader)?;
        if len > 16 {
            return Err(EncodingError::CurrencyOverflow(len as u64));
        }
        let mut bytes = [0u8; 16];
        reader.read_exact(&mut bytes[16 - len..])?;
        if len > 0 && bytes[16 - len] == 0 {
            return Err(EncodingError::NonMinimalCurrency);
        }
        Ok(Self(u128::from_be_bytes(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{deserialize, serialize};

    #[test]
    fn test_minimal_big_endian_encoding() {
        assert_eq!(serialize(&Currency::ZERO), vec![0; 8]);
        assert_eq!(
            serialize(&Currency::new(0x0100)),
            vec![2, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x00]
        );
        let max = Currency::new(u128::MAX);
        assert_eq!(deserialize::<Currency>(&serialize(&max)).unwrap(), max);
    }

    #[test]
    fn test_rejects_non_minimal_encoding() {
        let bytes = vec![2, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x05];
        assert!(matches!(
            deserialize::<Currency>(&bytes),
            Err(EncodingError::NonMinimalCurrency)
        ));
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Currency::new(10);
        assert_eq!(a.checked_sub(Currency::new(11)), None);
        assert_eq!(Currency::new(u128::MAX).checked_add(a), None);
        assert_eq!(
            Currency::checked_sum([a, a, a]),
            Some(Currency::new(30))
        );
    }
}
