//! Cryptographic building blocks for the UO protocol.
//!
//! Provides:
//! - `BitString` — bit-exact container over 32-bit words
//! - PKCS#7 and PKCS#1 v1.5 padding with strict validation
//! - AES-256-CBC encrypt/decrypt and AES-256-CBC-MAC
//! - RSA transport-key wrapping (raw modpow over an import public key)
//! - RFC 4226 HOTP generation
//! - SHA-256 hash macro

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
pub mod cbc;
pub mod hotp;
pub mod padding;
pub mod rsa;
mod sha;

pub use bits::BitString;
pub use cbc::{CbcError, Padding};
pub use padding::PadError;
pub use rsa::PublicKey;

/// Fill `buf` from the process CSPRNG.
pub fn random_bytes(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}

/// A fresh random 256-bit key.
pub fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    random_bytes(&mut key);
    key
}
