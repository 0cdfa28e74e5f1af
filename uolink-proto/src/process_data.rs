//! The `ProcessData` envelope — building requests and parsing replies.
//!
//! Request layout before transport:
//!
//! ```text
//! PDIN  = 0x1F ‖ UOid(4B BE) ‖ nonce(8B) ‖ userData
//! PDIN' = pkcs7(PDIN)
//! CT    = AES-256-CBC(encKey, IV = 0, PDIN')     // nonce block doubles as IV
//! TAG   = AES-256-CBC-MAC(macKey, CT)
//! wire  = "Packet0_" ‖ reqType ‖ "_" ‖ hex(plainLen(2B) ‖ plainData ‖ CT ‖ TAG)
//! ```
//!
//! The reply mirrors it with flag `0xF1` and the nonce words incremented by
//! `0x01010101`. The MAC is verified before anything is decrypted.

use std::fmt;

use uolink_crypto::cbc::{self, CbcError};
use uolink_crypto::padding;
use uolink_crypto::{BitString, Padding};

use crate::envelope::ResponseEnvelope;
use crate::nonce::{self, NONCE_LEN};
use crate::status;

/// First plaintext byte of every request.
pub const REQUEST_FLAG: u8 = 0x1f;
/// First plaintext byte of every reply.
pub const RESPONSE_FLAG: u8 = 0xf1;

const ZERO_IV: [u8; 16] = [0u8; 16];
const TAG_LEN: usize = 16;
/// Flag byte + UOid + nonce.
const HEADER_LEN: usize = 1 + 4 + NONCE_LEN;

// ─── Request type ────────────────────────────────────────────────────────────

/// The operation token embedded in the wire string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RequestType {
    /// AES-256 encrypt under the UO's app key.
    PlainAes,
    /// AES-256 decrypt under the UO's app key.
    PlainAesDecrypt,
    /// RSA-1024 decrypt.
    Rsa1024,
    /// RSA-2048 decrypt.
    Rsa2048,
    /// Auth-context operations (HOTP / password).
    Auth,
    /// Any token this library has no dedicated variant for.
    Other(String),
}

impl RequestType {
    /// The token as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainAes        => "PLAINAES",
            Self::PlainAesDecrypt => "PLAINAESDECRYPT",
            Self::Rsa1024         => "RSA1024",
            Self::Rsa2048         => "RSA2048",
            Self::Auth            => "AUTH",
            Self::Other(s)        => s,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors from [`build`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BuildError {
    /// `plainData` exceeds the 16-bit length field.
    PlainTooLarge(usize),
    /// The crypto layer rejected the input.
    Crypto(CbcError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainTooLarge(n) => write!(f, "plain data of {n} bytes exceeds the 16-bit length field"),
            Self::Crypto(e)        => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for BuildError {}

impl From<CbcError> for BuildError {
    fn from(e: CbcError) -> Self { Self::Crypto(e) }
}

/// Errors from [`parse`]. Each is fatal; no partial data is returned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The envelope's `status` field is not hex.
    BadStatus(String),
    /// The HSM returned a non-OK status word.
    ErrorStatus {
        /// The status word.
        code: u16,
        /// The envelope's `statusdetail`, when present.
        detail: Option<String>,
    },
    /// The envelope has no string `result`.
    MissingResult,
    /// The binary body is not valid hex.
    BadHex,
    /// The binary body is too short for its declared fields.
    Truncated,
    /// Recomputed CBC-MAC does not match the trailing tag.
    MacMismatch,
    /// Decryption or PKCS#7 validation failed.
    Crypto(CbcError),
    /// The decrypted frame does not start with `0xF1`.
    FlagMismatch {
        /// The byte found instead.
        found: u8,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus(s)      => write!(f, "status field {s:?} is not hex"),
            Self::ErrorStatus { code, .. } => write!(f, "HSM returned status {code:#06x}"),
            Self::MissingResult     => write!(f, "envelope carries no result"),
            Self::BadHex            => write!(f, "result body is not valid hex"),
            Self::Truncated         => write!(f, "result body is truncated"),
            Self::MacMismatch       => write!(f, "response MAC mismatch"),
            Self::Crypto(e)         => write!(f, "{e}"),
            Self::FlagMismatch { found } => {
                write!(f, "response flag {found:#04x} (wanted {RESPONSE_FLAG:#04x})")
            }
        }
    }
}
impl std::error::Error for ParseError {}

impl From<CbcError> for ParseError {
    fn from(e: CbcError) -> Self { Self::Crypto(e) }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Inputs for one `ProcessData` request.
#[derive(Clone, Debug)]
pub struct ProcessDataRequest {
    /// Target UO id.
    pub uo_id: u32,
    /// Operation token.
    pub req_type: RequestType,
    /// Unencrypted data carried next to the ciphertext (usually empty).
    pub plain_data: Vec<u8>,
    /// Data encrypted and authenticated inside the frame.
    pub user_data: Vec<u8>,
    /// Fixed freshness nonce; `None` draws 8 CSPRNG bytes.
    pub nonce: Option<[u8; NONCE_LEN]>,
}

impl ProcessDataRequest {
    /// A request with empty plain data and a fresh nonce.
    pub fn new(uo_id: u32, req_type: RequestType, user_data: impl Into<Vec<u8>>) -> Self {
        Self { uo_id, req_type, plain_data: Vec::new(), user_data: user_data.into(), nonce: None }
    }
}

/// A built request: the wire string plus the nonce to correlate the reply.
#[derive(Clone, Debug)]
pub struct BuiltRequest {
    /// The `Packet0_…` string sent as the `data` field.
    pub wire: String,
    /// The freshness nonce embedded in the frame.
    pub nonce: [u8; NONCE_LEN],
}

/// Assemble, pad, encrypt, and MAC one request.
pub fn build(
    req: &ProcessDataRequest,
    enc_key: &[u8; 32],
    mac_key: &[u8; 32],
) -> Result<BuiltRequest, BuildError> {
    if req.plain_data.len() > usize::from(u16::MAX) {
        return Err(BuildError::PlainTooLarge(req.plain_data.len()));
    }
    let nonce = req.nonce.unwrap_or_else(nonce::generate);

    let mut pdin = Vec::with_capacity(HEADER_LEN + req.user_data.len());
    pdin.push(REQUEST_FLAG);
    pdin.extend_from_slice(&req.uo_id.to_be_bytes());
    pdin.extend_from_slice(&nonce);
    pdin.extend_from_slice(&req.user_data);

    let padded = padding::pkcs7_pad(pdin);
    let ct = cbc::encrypt(enc_key, &ZERO_IV, &padded, Padding::None)?;
    let tag = cbc::cbc_mac(mac_key, &ct)?;

    let mut body = Vec::with_capacity(2 + req.plain_data.len() + ct.len() + TAG_LEN);
    body.extend_from_slice(&(req.plain_data.len() as u16).to_be_bytes());
    body.extend_from_slice(&req.plain_data);
    body.extend_from_slice(&ct);
    body.extend_from_slice(&tag);

    Ok(BuiltRequest {
        wire: format!("Packet0_{}_{}", req.req_type.as_str(), hex::encode(body)),
        nonce,
    })
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// A verified, decrypted reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessDataResponse {
    /// Status word (always `0x9000` here; errors short-circuit in [`parse`]).
    pub status: u16,
    /// Unencrypted data echoed next to the ciphertext.
    pub plain_data: Vec<u8>,
    /// UOid echoed inside the authenticated frame.
    pub uo_id: u32,
    /// Demangled freshness nonce; the caller's correlation key.
    pub nonce: [u8; NONCE_LEN],
    /// The decrypted payload.
    pub protected_data: Vec<u8>,
}

/// Verify and decrypt a reply envelope.
///
/// The steps run strictly in order and every failure is fatal: status,
/// framing, MAC, decrypt, flag, nonce. The MAC comparison is constant-time.
pub fn parse(
    env: &ResponseEnvelope,
    enc_key: &[u8; 32],
    mac_key: &[u8; 32],
) -> Result<ProcessDataResponse, ParseError> {
    let code = env.status_code().ok_or_else(|| ParseError::BadStatus(env.status.clone()))?;
    if !status::is_ok(code) {
        return Err(ParseError::ErrorStatus { code, detail: env.statusdetail.clone() });
    }

    let result = env.result.as_ref().and_then(|v| v.as_str()).ok_or(ParseError::MissingResult)?;
    let head = result.split('_').next().unwrap_or(result);
    let body = hex::decode(head).map_err(|_| ParseError::BadHex)?;

    if body.len() < 2 {
        return Err(ParseError::Truncated);
    }
    let plain_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
    // plain data + at least one ciphertext block + the tag
    if body.len() < 2 + plain_len + 16 + TAG_LEN {
        return Err(ParseError::Truncated);
    }
    let plain_data = body[2..2 + plain_len].to_vec();
    let ct = &body[2 + plain_len..body.len() - TAG_LEN];
    let tag = &body[body.len() - TAG_LEN..];

    let computed = cbc::cbc_mac(mac_key, ct)?;
    if !BitString::from_bytes(&computed).ct_eq(&BitString::from_bytes(tag)) {
        log::warn!("ProcessData response failed MAC verification");
        return Err(ParseError::MacMismatch);
    }

    let dec = cbc::decrypt(enc_key, &ZERO_IV, ct, Padding::Pkcs7)?;
    if dec.len() < HEADER_LEN {
        return Err(ParseError::Truncated);
    }
    if dec[0] != RESPONSE_FLAG {
        return Err(ParseError::FlagMismatch { found: dec[0] });
    }

    let uo_id = u32::from_be_bytes([dec[1], dec[2], dec[3], dec[4]]);
    let mangled = BitString::from_bytes(&dec[5..5 + NONCE_LEN]);
    let mut resp_nonce = [0u8; NONCE_LEN];
    resp_nonce.copy_from_slice(&nonce::demangle(&mangled).to_bytes());

    Ok(ProcessDataResponse {
        status: code,
        plain_data,
        uo_id,
        nonce: resp_nonce,
        protected_data: dec[HEADER_LEN..].to_vec(),
    })
}
