//! Bit-exact container used by the wire codec.
//!
//! Several protocol fields are not byte-aligned: HOTP dynamic truncation
//! reads a 31-bit window, template key slots are addressed by bit offset,
//! and the response-nonce transform operates on 32-bit words with a
//! partial tail. `BitString` stores big-endian 32-bit words together with
//! an exact bit length so those operations stay lossless.

use subtle::ConstantTimeEq;

/// A sequence of bits backed by big-endian `u32` words.
///
/// Bit `i` lives in word `i / 32` at position `31 - (i % 32)`, i.e. the
/// stream starts at the most significant bit of the first word. The final
/// word keeps its bits in the high positions; everything below `bit_len`
/// is zero.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BitString {
    words:   Vec<u32>,
    bit_len: usize,
}

impl BitString {
    /// The empty bit string.
    pub fn new() -> Self {
        Self { words: Vec::new(), bit_len: 0 }
    }

    /// Construct from raw words and an exact bit length.
    ///
    /// Bits of the last word beyond `bit_len` are cleared.
    pub fn from_words(words: Vec<u32>, bit_len: usize) -> Self {
        debug_assert!(bit_len <= words.len() * 32);
        let mut out = Self { words, bit_len };
        out.words.truncate(bit_len.div_ceil(32));
        out.mask_tail();
        out
    }

    /// Construct from bytes (bit length = `8 * bytes.len()`).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut words = Vec::with_capacity(bytes.len().div_ceil(4));
        for chunk in bytes.chunks(4) {
            let mut w = 0u32;
            for (i, &b) in chunk.iter().enumerate() {
                w |= u32::from(b) << (24 - 8 * i);
            }
            words.push(w);
        }
        Self { words, bit_len: bytes.len() * 8 }
    }

    /// Serialize to bytes, `ceil(bit_len / 8)` of them.
    ///
    /// A trailing partial byte carries its bits in the high positions.
    pub fn to_bytes(&self) -> Vec<u8> {
        let n = self.bit_len.div_ceil(8);
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let w = self.words[i / 4];
            out.push((w >> (24 - 8 * (i % 4))) as u8);
        }
        out
    }

    /// Parse a hex string (whole bytes only). Returns `None` on bad hex.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(|b| Self::from_bytes(&b))
    }

    /// Lowercase hex of [`BitString::to_bytes`].
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode RFC 4648 base32 (padding optional, case-insensitive).
    pub fn from_base32(s: &str) -> Option<Self> {
        let norm: String = s.chars()
            .filter(|c| *c != '=' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        data_encoding::BASE32_NOPAD
            .decode(norm.as_bytes())
            .ok()
            .map(|b| Self::from_bytes(&b))
    }

    /// Encode as unpadded base32.
    pub fn to_base32(&self) -> String {
        data_encoding::BASE32_NOPAD.encode(&self.to_bytes())
    }

    /// A `u64` as a 64-bit string (big-endian).
    pub fn from_u64(v: u64) -> Self {
        Self { words: vec![(v >> 32) as u32, v as u32], bit_len: 64 }
    }

    /// Read 64 bits starting at bit offset `lo`.
    pub fn read_u64(&self, lo: usize) -> u64 {
        (u64::from(self.extract32(lo)) << 32) | u64::from(self.extract32(lo + 32))
    }

    /// Exact length in bits.
    pub fn bit_len(&self) -> usize { self.bit_len }

    /// True when no bits are stored.
    pub fn is_empty(&self) -> bool { self.bit_len == 0 }

    /// The backing words. The tail word is zero below `bit_len`.
    pub fn words(&self) -> &[u32] { &self.words }

    /// Append `other` after the last bit of `self`.
    pub fn concat(&self, other: &Self) -> Self {
        let shift = self.bit_len % 32;
        if shift == 0 {
            let mut words = self.words.clone();
            words.extend_from_slice(&other.words);
            return Self { words, bit_len: self.bit_len + other.bit_len };
        }

        let mut words = self.words.clone();
        // The partial tail word keeps `shift` bits in its high positions;
        // every word of `other` is threaded through it.
        let mut acc = words.pop().unwrap_or(0);
        for &w in &other.words {
            words.push(acc | (w >> shift));
            acc = w << (32 - shift);
        }
        let bit_len = self.bit_len + other.bit_len;
        if bit_len.div_ceil(32) > words.len() {
            words.push(acc);
        }
        let mut out = Self { words, bit_len };
        out.mask_tail();
        out
    }

    /// The bits in `[lo, hi)` as a new string.
    pub fn slice(&self, lo: usize, hi: usize) -> Self {
        debug_assert!(lo <= hi && hi <= self.bit_len, "slice out of range");
        let bit_len = hi - lo;
        let mut words = Vec::with_capacity(bit_len.div_ceil(32));
        let mut taken = 0;
        while taken < bit_len {
            words.push(self.word_at(lo + taken));
            taken += 32;
        }
        let mut out = Self { words, bit_len };
        out.mask_tail();
        out
    }

    /// Value of the `width` bits starting at `lo`, with `width < 32`.
    ///
    /// Whole words go through [`BitString::extract32`].
    pub fn extract(&self, lo: usize, width: usize) -> u32 {
        debug_assert!(width > 0 && width < 32, "use extract32 for whole words");
        debug_assert!(lo + width <= self.bit_len, "extract out of range");
        self.word_at(lo) >> (32 - width)
    }

    /// The full 32-bit word starting at bit `lo`.
    pub fn extract32(&self, lo: usize) -> u32 {
        self.word_at(lo)
    }

    /// Bitwise XOR of two equal-length strings.
    pub fn xor(&self, other: &Self) -> Self {
        debug_assert_eq!(self.bit_len, other.bit_len, "xor length mismatch");
        let words = self.words.iter()
            .zip(&other.words)
            .map(|(a, b)| a ^ b)
            .collect();
        Self { words, bit_len: self.bit_len }
    }

    /// Constant-time equality over the stored words.
    ///
    /// Lengths are compared in the clear (they are framing, not secrets);
    /// the word contents are compared without early exit.
    pub fn ct_eq(&self, other: &Self) -> bool {
        if self.bit_len != other.bit_len {
            return false;
        }
        let mut acc = subtle::Choice::from(1u8);
        for (a, b) in self.words.iter().zip(&other.words) {
            acc &= a.ct_eq(b);
        }
        acc.into()
    }

    /// 32 bits starting at an arbitrary bit offset, zero-filled past the end.
    fn word_at(&self, bit: usize) -> u32 {
        let off = bit % 32;
        let hi = self.words.get(bit / 32).copied().unwrap_or(0);
        if off == 0 {
            hi
        } else {
            let lo = self.words.get(bit / 32 + 1).copied().unwrap_or(0);
            (hi << off) | (lo >> (32 - off))
        }
    }

    fn mask_tail(&mut self) {
        let r = self.bit_len % 32;
        if r != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= u32::MAX << (32 - r);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let b = BitString::from_bytes(&[0xde, 0xad, 0xbe, 0xef, 0x01]);
        assert_eq!(b.bit_len(), 40);
        assert_eq!(b.words(), &[0xdeadbeef, 0x01000000]);
        assert_eq!(b.to_bytes(), vec![0xde, 0xad, 0xbe, 0xef, 0x01]);
    }

    #[test]
    fn hex_round_trip() {
        let b = BitString::from_hex("aaaabbbbccccdddd").unwrap();
        assert_eq!(b.bit_len(), 64);
        assert_eq!(b.to_hex(), "aaaabbbbccccdddd");
        assert!(BitString::from_hex("zz").is_none());
    }

    #[test]
    fn concat_unaligned() {
        let a = BitString::from_bytes(&[0x12]);
        let b = BitString::from_bytes(&[0x34, 0x56, 0x78, 0x9a, 0xbc]);
        let c = a.concat(&b);
        assert_eq!(c.bit_len(), 48);
        assert_eq!(c.to_bytes(), vec![0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]);
    }

    #[test]
    fn concat_word_boundary() {
        let a = BitString::from_bytes(&[1, 2, 3, 4]);
        let b = BitString::from_bytes(&[5, 6]);
        let c = a.concat(&b);
        assert_eq!(c.to_bytes(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(c.bit_len(), 48);
    }

    #[test]
    fn slice_inside_word() {
        let b = BitString::from_bytes(&[0xab, 0xcd, 0xef, 0x01, 0x23]);
        assert_eq!(b.slice(8, 24).to_bytes(), vec![0xcd, 0xef]);
        assert_eq!(b.slice(0, 40).to_bytes(), b.to_bytes());
        assert_eq!(b.slice(4, 12).bit_len(), 8);
        assert_eq!(b.slice(4, 12).to_bytes(), vec![0xbc]);
    }

    #[test]
    fn extract_widths() {
        let b = BitString::from_bytes(&[0b1011_0001, 0xff, 0x00, 0x00, 0x80]);
        assert_eq!(b.extract(0, 4), 0b1011);
        assert_eq!(b.extract(4, 8), 0b0001_1111);
        // A full word crossing a word boundary must not mis-shift.
        assert_eq!(b.extract32(8), 0xff00_0080);
    }

    #[test]
    fn u64_round_trip() {
        let b = BitString::from_u64(0x0123_4567_89ab_cdef);
        assert_eq!(b.bit_len(), 64);
        assert_eq!(b.read_u64(0), 0x0123_4567_89ab_cdef);
        let shifted = BitString::from_bytes(&[0x55]).concat(&b);
        assert_eq!(shifted.read_u64(8), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn xor_and_ct_eq() {
        let a = BitString::from_bytes(&[0xf0, 0x0f]);
        let b = BitString::from_bytes(&[0x0f, 0xf0]);
        assert_eq!(a.xor(&b).to_bytes(), vec![0xff, 0xff]);
        assert!(a.ct_eq(&a.clone()));
        assert!(!a.ct_eq(&b));
        assert!(!a.ct_eq(&a.slice(0, 8)));
    }

    #[test]
    fn base32_round_trip() {
        let b = BitString::from_bytes(b"12345678901234567890");
        let enc = b.to_base32();
        assert_eq!(BitString::from_base32(&enc).unwrap(), b);
        assert_eq!(BitString::from_base32(&enc.to_lowercase()).unwrap(), b);
    }

    #[test]
    fn partial_tail_is_masked() {
        let b = BitString::from_words(vec![0xffff_ffff, 0xffff_ffff], 56);
        assert_eq!(b.words()[1], 0xffff_ff00);
        assert_eq!(b.to_bytes().len(), 7);
    }
}
