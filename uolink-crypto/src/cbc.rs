//! AES-256-CBC and AES-256-CBC-MAC.
//!
//! The wire format always uses a zero IV: every encrypted frame starts with
//! a fresh random nonce, so the first block already differs per request.
//! The MAC key is always distinct from the encryption key.

use std::fmt;

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::padding::{self, BLOCK_LEN, PadError};

/// Whether the CBC layer applies PKCS#7 itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Padding {
    /// Caller guarantees block alignment; input is used as-is.
    None,
    /// PKCS#7 appended on encrypt, verified and stripped on decrypt.
    Pkcs7,
}

/// Errors from the CBC layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CbcError {
    /// Key is not 32 bytes.
    KeyLength,
    /// Unpadded input (or any MAC input) must be a positive multiple of 16.
    BlockAlignment,
    /// PKCS#7 validation failed on decrypt.
    Padding(PadError),
}

impl fmt::Display for CbcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyLength      => write!(f, "AES-256 key must be 32 bytes"),
            Self::BlockAlignment => write!(f, "input not a positive multiple of 16 bytes"),
            Self::Padding(e)     => write!(f, "bad PKCS#7 padding: {e}"),
        }
    }
}
impl std::error::Error for CbcError {}

/// AES-256-CBC encrypt with a caller-supplied IV.
pub fn encrypt(key: &[u8], iv: &[u8; BLOCK_LEN], data: &[u8], pad: Padding) -> Result<Vec<u8>, CbcError> {
    let cipher = Aes256::new_from_slice(key).map_err(|_| CbcError::KeyLength)?;
    let mut buf = match pad {
        Padding::Pkcs7 => padding::pkcs7_pad(data.to_vec()),
        Padding::None => {
            if data.is_empty() || data.len() % BLOCK_LEN != 0 {
                return Err(CbcError::BlockAlignment);
            }
            data.to_vec()
        }
    };

    let mut prev = *iv;
    for block in buf.chunks_exact_mut(BLOCK_LEN) {
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        prev.copy_from_slice(block);
    }
    Ok(buf)
}

/// AES-256-CBC decrypt; with [`Padding::Pkcs7`] the tail is strictly verified.
pub fn decrypt(key: &[u8], iv: &[u8; BLOCK_LEN], data: &[u8], pad: Padding) -> Result<Vec<u8>, CbcError> {
    let cipher = Aes256::new_from_slice(key).map_err(|_| CbcError::KeyLength)?;
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CbcError::BlockAlignment);
    }

    let mut buf = data.to_vec();
    let mut prev = *iv;
    for block in buf.chunks_exact_mut(BLOCK_LEN) {
        let mut ct = [0u8; BLOCK_LEN];
        ct.copy_from_slice(block);
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev = ct;
    }

    match pad {
        Padding::None => Ok(buf),
        Padding::Pkcs7 => {
            let stripped = padding::pkcs7_unpad(&buf).map_err(CbcError::Padding)?;
            Ok(stripped.to_vec())
        }
    }
}

/// AES-256-CBC-MAC: zero IV, separate key, tag = last ciphertext block.
///
/// Inputs that are not a positive multiple of 16 bytes are rejected; the
/// caller aligns them (the wire MACs only already-padded ciphertext).
pub fn cbc_mac(key: &[u8], data: &[u8]) -> Result<[u8; BLOCK_LEN], CbcError> {
    let cipher = Aes256::new_from_slice(key).map_err(|_| CbcError::KeyLength)?;
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CbcError::BlockAlignment);
    }

    let mut tag = [0u8; BLOCK_LEN];
    for block in data.chunks_exact(BLOCK_LEN) {
        for (t, b) in tag.iter_mut().zip(block.iter()) {
            *t ^= b;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut tag));
    }
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0u8; 32];
    const IV: [u8; 16] = [0u8; 16];

    #[test]
    fn cbc_round_trip_padded() {
        let pt = b"attack at dawn";
        let ct = encrypt(&KEY, &IV, pt, Padding::Pkcs7).unwrap();
        assert_eq!(ct.len() % 16, 0);
        assert_eq!(decrypt(&KEY, &IV, &ct, Padding::Pkcs7).unwrap(), pt);
    }

    #[test]
    fn cbc_round_trip_unpadded() {
        let pt = [0x42u8; 32];
        let ct = encrypt(&KEY, &IV, &pt, Padding::None).unwrap();
        assert_eq!(decrypt(&KEY, &IV, &ct, Padding::None).unwrap(), pt);
    }

    #[test]
    fn unpadded_requires_alignment() {
        assert_eq!(encrypt(&KEY, &IV, &[1, 2, 3], Padding::None), Err(CbcError::BlockAlignment));
        assert_eq!(decrypt(&KEY, &IV, &[1, 2, 3], Padding::None), Err(CbcError::BlockAlignment));
        assert_eq!(encrypt(&KEY, &IV, &[], Padding::None), Err(CbcError::BlockAlignment));
    }

    #[test]
    fn corrupted_padding_is_rejected() {
        let ct = encrypt(&KEY, &IV, b"sixteen byte msg", Padding::Pkcs7).unwrap();
        // decrypting only the first block exposes plaintext with no valid tail
        let err = decrypt(&KEY, &IV, &ct[..16], Padding::Pkcs7).unwrap_err();
        assert!(matches!(err, CbcError::Padding(_)), "got {err:?}");
    }

    #[test]
    fn mac_depends_on_every_block() {
        let mac_key = [1u8; 32];
        let data = [0x5au8; 48];
        let tag = cbc_mac(&mac_key, &data).unwrap();
        let mut flipped = data;
        flipped[0] ^= 0x80;
        assert_ne!(cbc_mac(&mac_key, &flipped).unwrap(), tag);
        let mut tail_flipped = data;
        tail_flipped[47] ^= 0x01;
        assert_ne!(cbc_mac(&mac_key, &tail_flipped).unwrap(), tag);
    }

    #[test]
    fn mac_rejects_misaligned_input() {
        assert_eq!(cbc_mac(&KEY, &[0u8; 15]), Err(CbcError::BlockAlignment));
        assert_eq!(cbc_mac(&KEY, &[]), Err(CbcError::BlockAlignment));
    }

    #[test]
    fn short_keys_are_rejected() {
        assert_eq!(encrypt(&[0u8; 16], &IV, &[0u8; 16], Padding::None), Err(CbcError::KeyLength));
        assert_eq!(cbc_mac(&[0u8; 16], &[0u8; 16]), Err(CbcError::KeyLength));
    }
}
