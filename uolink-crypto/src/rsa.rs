//! Raw RSA used to wrap transport keys under the service's import key.

use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;

use crate::padding::{self, PadError};

/// TLV tag carrying the public exponent.
const TAG_EXPONENT: u8 = 0x81;
/// TLV tag carrying the modulus.
const TAG_MODULUS: u8 = 0x82;

/// Errors from parsing or using an import public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyError {
    /// The TLV hex string could not be decoded.
    BadEncoding,
    /// Exponent or modulus missing from the TLV.
    MissingField,
    /// PKCS#1 padding failed (data too large for the modulus).
    Pad(PadError),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadEncoding  => write!(f, "import key TLV is not valid hex"),
            Self::MissingField => write!(f, "import key TLV lacks exponent or modulus"),
            Self::Pad(e)       => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for KeyError {}

/// An RSA public key `(n, e)`.
#[derive(Clone, Debug)]
pub struct PublicKey {
    n: BigUint,
    e: BigUint,
    modulus_len: usize,
}

impl PublicKey {
    /// Build from big-endian modulus and exponent bytes.
    pub fn from_parts(n: &[u8], e: &[u8]) -> Self {
        Self {
            n: BigUint::from_bytes_be(n),
            e: BigUint::from_bytes_be(e),
            modulus_len: n.len(),
        }
    }

    /// Parse the service's TLV key encoding: `81 ‖ len(2B) ‖ e` and
    /// `82 ‖ len(2B) ‖ n` records in any order, unknown tags skipped.
    /// Whitespace inside the hex is accepted.
    pub fn from_tlv_hex(s: &str) -> Result<Self, KeyError> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&compact).map_err(|_| KeyError::BadEncoding)?;

        let mut n = None;
        let mut e = None;
        let mut pos = 0;
        while pos + 3 <= bytes.len() {
            let tag = bytes[pos];
            let len = usize::from(u16::from_be_bytes([bytes[pos + 1], bytes[pos + 2]]));
            let end = pos + 3 + len;
            if end > bytes.len() {
                return Err(KeyError::BadEncoding);
            }
            match tag {
                TAG_EXPONENT => e = Some(bytes[pos + 3..end].to_vec()),
                TAG_MODULUS  => n = Some(bytes[pos + 3..end].to_vec()),
                _ => {}
            }
            pos = end;
        }
        if pos != bytes.len() {
            return Err(KeyError::BadEncoding);
        }
        match (n, e) {
            (Some(n), Some(e)) => Ok(Self::from_parts(&n, &e)),
            _ => Err(KeyError::MissingField),
        }
    }

    /// Modulus length in bytes (128 for RSA-1024, 256 for RSA-2048).
    pub fn modulus_len(&self) -> usize { self.modulus_len }

    /// `dataᵉ mod n`, left-padded with zeros to the modulus length.
    pub fn encrypt_raw(&self, data: &[u8]) -> Vec<u8> {
        let m = BigUint::from_bytes_be(data);
        let c = m.modpow(&self.e, &self.n);
        let mut block = c.to_bytes_be();
        if c.is_zero() {
            block.clear();
        }
        while block.len() < self.modulus_len {
            block.insert(0, 0);
        }
        block
    }

    /// PKCS#1 v1.5 type-2 pad `data` to the modulus length, then encrypt.
    pub fn wrap(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        let block = padding::pkcs1_pad(data, self.modulus_len, 2).map_err(KeyError::Pad)?;
        Ok(self.encrypt_raw(&block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Textbook key: n = 3233 = 61 * 53, e = 17, d = 413.
    const N: u64 = 3233;
    const E: u64 = 17;
    const D: u64 = 413;

    #[test]
    fn raw_encrypt_matches_modpow() {
        let key = PublicKey::from_parts(&N.to_be_bytes()[6..], &E.to_be_bytes()[7..]);
        assert_eq!(key.modulus_len(), 2);
        let ct = key.encrypt_raw(&[0x00, 0x41]); // m = 65
        let c = u64::from(u16::from_be_bytes([ct[0], ct[1]]));
        assert_eq!(c, modpow(65, E, N));
        assert_eq!(modpow(c, D, N), 65, "private exponent must invert the wrap");
    }

    fn modpow(mut b: u64, mut e: u64, m: u64) -> u64 {
        let mut acc = 1u64;
        b %= m;
        while e > 0 {
            if e & 1 == 1 { acc = acc * b % m; }
            b = b * b % m;
            e >>= 1;
        }
        acc
    }

    #[test]
    fn tlv_parse_skips_unknown_tags() {
        // 0x7f (unknown) + exponent + modulus, with spaces
        let hex = "7f 0001 aa 81 0003 010001 82 0004 c35d 9f2b";
        let key = PublicKey::from_tlv_hex(hex).unwrap();
        assert_eq!(key.modulus_len(), 4);
    }

    #[test]
    fn tlv_parse_rejects_truncated_and_partial() {
        assert_eq!(PublicKey::from_tlv_hex("81 0004 0100").unwrap_err(), KeyError::BadEncoding);
        assert_eq!(PublicKey::from_tlv_hex("81 0003 010001").unwrap_err(), KeyError::MissingField);
        assert_eq!(PublicKey::from_tlv_hex("zz").unwrap_err(), KeyError::BadEncoding);
    }
}
