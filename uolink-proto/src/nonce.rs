//! Freshness nonces and the response-nonce transform.
//!
//! Every request carries 8 random bytes. The HSM echoes them back with
//! `0x01010101` added to each 32-bit word; the parser undoes exactly that
//! before comparing against the request nonce.

use uolink_crypto::BitString;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 8;

/// Per-word constant the server adds to the echoed nonce.
pub const MANGLE_STEP: u32 = 0x0101_0101;

/// 8 fresh CSPRNG bytes.
pub fn generate() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).expect("getrandom failed");
    nonce
}

/// The server-side transform: add `0x01010101` to each word.
///
/// Exists so loopback tests can mirror a request without a live HSM.
pub fn mangle(bits: &BitString) -> BitString {
    transform(bits, u32::wrapping_add)
}

/// Undo the server transform on an echoed nonce.
///
/// For a final partial word of `r < 32` bits the constant is shifted so
/// that only the high `r` bits participate in the subtraction.
pub fn demangle(bits: &BitString) -> BitString {
    transform(bits, u32::wrapping_sub)
}

fn transform(bits: &BitString, op: fn(u32, u32) -> u32) -> BitString {
    let bl = bits.bit_len();
    let words: Vec<u32> = bits.words().iter().enumerate()
        .map(|(i, &w)| {
            let tail = bl - i * 32;
            let step = if tail >= 32 {
                MANGLE_STEP
            } else {
                (MANGLE_STEP >> (32 - tail)) << (32 - tail)
            };
            op(w, step)
        })
        .collect();
    BitString::from_words(words, bl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_hexable() {
        let n = generate();
        assert_eq!(hex::encode(n).len(), 16);
    }

    #[test]
    fn demangle_inverts_mangle_for_whole_bytes() {
        for k in 1..=16usize {
            let bytes: Vec<u8> = (0..k as u8).map(|i| i.wrapping_mul(0x3b).wrapping_add(7)).collect();
            let n = BitString::from_bytes(&bytes);
            let round = demangle(&mangle(&n));
            assert_eq!(round, n, "bit length {}", 8 * k);
        }
    }

    #[test]
    fn partial_tail_uses_shifted_constant() {
        // 56 bits: second word carries 24 bits in its high positions.
        let mangled = BitString::from_words(vec![0x0101_0101, 0x0101_0100], 56);
        let clear = demangle(&mangled);
        assert_eq!(clear.words(), &[0x0000_0000, 0x0000_0000]);
        assert_eq!(clear.bit_len(), 56);
    }

    #[test]
    fn byte_increment_view() {
        // With no carries the transform is a per-byte +1.
        let n = BitString::from_bytes(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80]);
        assert_eq!(mangle(&n).to_bytes(), vec![0x11, 0x21, 0x31, 0x41, 0x51, 0x61, 0x71, 0x81]);
    }
}
