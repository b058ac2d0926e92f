use crate::encoding::{Decodable, Encodable, EncodingError, read_array};
use std::fmt;
use std::io::{self, Read, Write};

pub const SPECIFIER_LEN: usize = 16;

/// Fixed-length tag naming the semantic type of a hashed or embedded object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Specifier(pub [u8; SPECIFIER_LEN]);

impl Specifier {
    /// Builds a specifier from an ASCII tag, zero-padding it to 16 bytes.
    pub const fn new(tag: &str) -> Self {
        let bytes = tag.as_bytes();
        assert!(bytes.len() <= SPECIFIER_LEN, "specifier tag too long");
        let mut out = [0u8; SPECIFIER_LEN];
        let mut i = 0;
        while i < bytes.len() {
            out[i] = bytes[i];
            i += 1;
        }
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; SPECIFIER_LEN] {
        &self.0
    }
}

impl fmt::Debug for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(SPECIFIER_LEN);
        write!(f, "Specifier({})", String::from_utf8_lossy(&self.0[..end]))
    }
}

impl Encodable for Specifier {
    fn consensus_encode<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for Specifier {
    fn consensus_decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, EncodingError> {
        Ok(Self(read_array(reader)?))
    }
}

pub const SPECIFIER_COIN_OUTPUT: Specifier = Specifier::new("coin output");
pub const SPECIFIER_FILE_CONTRACT: Specifier = Specifier::new("file contract");
pub const SPECIFIER_FUND_OUTPUT: Specifier = Specifier::new("fund output");
pub const SPECIFIER_STORAGE_PROOF: Specifier = Specifier::new("storage proof");
pub const SPECIFIER_CLAIM_OUTPUT: Specifier = Specifier::new("claim output");
pub const SPECIFIER_FOUNDATION: Specifier = Specifier::new("foundation");
pub const SPECIFIER_ED25519: Specifier = Specifier::new("ed25519");
