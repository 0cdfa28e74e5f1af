//! PKCS#7 and PKCS#1 v1.5 padding.

use std::fmt;

use subtle::ConstantTimeEq;

/// AES block size; the only PKCS#7 block size on this wire.
pub const BLOCK_LEN: usize = 16;

/// Errors from the unpad paths.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PadError {
    /// Input empty or shorter than the declared padding.
    Length,
    /// Padding bytes do not match the scheme.
    Content,
    /// The data does not fit the requested block.
    DataTooLarge,
    /// Unknown block type byte.
    BlockType,
}

impl fmt::Display for PadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length       => write!(f, "padding length out of range"),
            Self::Content      => write!(f, "padding content invalid"),
            Self::DataTooLarge => write!(f, "data too large for block"),
            Self::BlockType    => write!(f, "unknown PKCS#1 block type"),
        }
    }
}
impl std::error::Error for PadError {}

// ─── PKCS#7 ──────────────────────────────────────────────────────────────────

/// Append PKCS#7 padding (always at least one byte, full block when aligned).
pub fn pkcs7_pad(mut data: Vec<u8>) -> Vec<u8> {
    let k = BLOCK_LEN - data.len() % BLOCK_LEN;
    data.resize(data.len() + k, k as u8);
    data
}

/// Strip PKCS#7 padding.
///
/// The tail bytes are checked without early exit so a forged tail costs the
/// same time as a valid one.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], PadError> {
    let k = *data.last().ok_or(PadError::Length)? as usize;
    if k == 0 || k > BLOCK_LEN || k > data.len() {
        return Err(PadError::Length);
    }
    let mut diff = 0u8;
    for &b in &data[data.len() - k..] {
        diff |= b ^ k as u8;
    }
    if bool::from(diff.ct_eq(&0)) {
        Ok(&data[..data.len() - k])
    } else {
        Err(PadError::Content)
    }
}

// ─── PKCS#1 v1.5 ─────────────────────────────────────────────────────────────

/// Pad `data` into a `block_len`-byte PKCS#1 v1.5 block:
/// `00 ‖ BT ‖ PS ‖ 00 ‖ data` with `|PS| ≥ 8`.
///
/// Filler: BT 0 → zeros, BT 1 → `0xFF`, BT 2 → uniform non-zero random bytes.
pub fn pkcs1_pad(data: &[u8], block_len: usize, bt: u8) -> Result<Vec<u8>, PadError> {
    if bt > 2 {
        return Err(PadError::BlockType);
    }
    if data.len() + 11 > block_len {
        return Err(PadError::DataTooLarge);
    }
    let ps_len = block_len - 3 - data.len();

    let mut block = Vec::with_capacity(block_len);
    block.push(0x00);
    block.push(bt);
    match bt {
        0 => block.resize(2 + ps_len, 0x00),
        1 => block.resize(2 + ps_len, 0xff),
        _ => {
            let mut ps = vec![0u8; ps_len];
            getrandom::getrandom(&mut ps).expect("getrandom failed");
            for b in ps.iter_mut() {
                while *b == 0 {
                    let mut one = [0u8; 1];
                    getrandom::getrandom(&mut one).expect("getrandom failed");
                    *b = one[0];
                }
            }
            block.extend_from_slice(&ps);
        }
    }
    block.push(0x00);
    block.extend_from_slice(data);
    Ok(block)
}

/// Strip PKCS#1 v1.5 padding, returning the embedded data.
///
/// BT 1 requires every filler byte to be `0xFF`; BT 2 requires non-zero
/// filler; BT 0 skips leading zero filler. A missing terminator or a filler
/// byte violating the block type is a padding error.
pub fn pkcs1_unpad(block: &[u8]) -> Result<Vec<u8>, PadError> {
    if block.len() < 11 || block[0] != 0x00 {
        return Err(PadError::Content);
    }
    let bt = block[1];
    match bt {
        0 => {
            let start = block[2..].iter().position(|&b| b != 0x00)
                .ok_or(PadError::Content)?;
            Ok(block[2 + start..].to_vec())
        }
        1 | 2 => {
            let mut i = 2;
            while i < block.len() && block[i] != 0x00 {
                if bt == 1 && block[i] != 0xff {
                    return Err(PadError::Content);
                }
                i += 1;
            }
            if i == block.len() || i - 2 < 8 {
                return Err(PadError::Content);
            }
            Ok(block[i + 1..].to_vec())
        }
        _ => Err(PadError::BlockType),
    }
}
