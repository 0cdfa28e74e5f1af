//! The nested TLV language of the user-auth sub-protocol.
//!
//! Auth operations ride inside `ProcessData` as a pair of outer TLV blocks:
//! the user's current context under `0xA3`, and the operation (`0xA5` HOTP
//! verify, `0xA4` password verify, `0xA7` update, `0xA8` new context).
//! Replies carry a fresh context the caller must persist even when the
//! verification itself failed: the HSM has already bumped its counters.

use std::fmt;

use uolink_crypto::cbc::{self, CbcError};
use uolink_crypto::{random_key, Padding};

use crate::cursor::{self, Cursor};

// ─── Tags ────────────────────────────────────────────────────────────────────

/// Outer tag: the user's (encrypted) auth context.
pub const TAG_USER_CTX: u8 = 0xa3;
/// Outer tag: password verification.
pub const TAG_PASSWD_VERIFY: u8 = 0xa4;
/// Outer tag: HOTP verification.
pub const TAG_HOTP_VERIFY: u8 = 0xa5;
/// Outer tag: context update (add/replace a method).
pub const TAG_UPDATE_CTX: u8 = 0xa7;
/// Outer tag: freshly built plaintext context.
pub const TAG_NEW_CTX: u8 = 0xa8;

/// Method record: global try counter.
pub const METHOD_GLOBAL_TRIES: u8 = 0x3e;
/// Method record: HOTP.
pub const METHOD_HOTP: u8 = 0x3f;
/// Method record: password.
pub const METHOD_PASSWD: u8 = 0x40;

const HOTP_SECRET_SLOT: usize = 16;
const ZERO_IV: [u8; 16] = [0u8; 16];

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors from building or parsing auth TLV.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TlvError {
    /// Frame ended early or a tag didn't match.
    Frame(cursor::Error),
    /// Bytes remained after the final status word.
    TrailingBytes(usize),
    /// A method record's body does not fit its type.
    BadMethodRecord(u8),
    /// The HOTP secret exceeds its 16-byte slot.
    SecretTooLong(usize),
    /// The crypto layer rejected the input.
    Crypto(CbcError),
}

impl fmt::Display for TlvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e)           => write!(f, "{e}"),
            Self::TrailingBytes(n)   => write!(f, "{n} trailing bytes after status"),
            Self::BadMethodRecord(t) => write!(f, "malformed method record {t:#04x}"),
            Self::SecretTooLong(n)   => write!(f, "HOTP secret of {n} bytes exceeds 16"),
            Self::Crypto(e)          => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for TlvError {}

impl From<cursor::Error> for TlvError {
    fn from(e: cursor::Error) -> Self { Self::Frame(e) }
}
impl From<CbcError> for TlvError {
    fn from(e: CbcError) -> Self { Self::Crypto(e) }
}

// ─── Auth context model ──────────────────────────────────────────────────────

/// One authentication method stored in a context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthMethod {
    /// RFC 4226 HOTP.
    Hotp {
        /// Moving counter.
        counter: u64,
        /// Failed attempts so far.
        current_fails: u8,
        /// Attempts allowed before lockout.
        max_fails: u8,
        /// Code length in decimal digits.
        digits: u8,
        /// Shared secret, at most 16 bytes.
        secret: Vec<u8>,
    },
    /// Static password, stored as a hash.
    Password {
        /// Failed attempts so far.
        current_fails: u8,
        /// Attempts allowed before lockout.
        max_fails: u8,
        /// Password hash (SHA-256 on this wire).
        hash: Vec<u8>,
    },
    /// Global try counter shared by all methods.
    GlobalTries {
        /// Remaining tries.
        tries: u8,
    },
}

impl AuthMethod {
    fn write(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        match self {
            Self::Hotp { counter, current_fails, max_fails, digits, secret } => {
                if secret.len() > HOTP_SECRET_SLOT {
                    return Err(TlvError::SecretTooLong(secret.len()));
                }
                let mut body = Vec::with_capacity(12 + HOTP_SECRET_SLOT);
                body.extend_from_slice(&counter.to_be_bytes());
                body.push(*current_fails);
                body.push(*max_fails);
                body.push(*digits);
                body.push(secret.len() as u8);
                body.extend_from_slice(secret);
                body.resize(12 + HOTP_SECRET_SLOT, 0);
                write_tlv(out, METHOD_HOTP, &body);
            }
            Self::Password { current_fails, max_fails, hash } => {
                let mut body = Vec::with_capacity(3 + hash.len());
                body.push(*current_fails);
                body.push(*max_fails);
                body.push(hash.len() as u8);
                body.extend_from_slice(hash);
                write_tlv(out, METHOD_PASSWD, &body);
            }
            Self::GlobalTries { tries } => {
                write_tlv(out, METHOD_GLOBAL_TRIES, &[*tries]);
            }
        }
        Ok(())
    }

    fn read(kind: u8, body: &[u8]) -> Result<Self, TlvError> {
        let mut c = Cursor::new(body);
        let method = match kind {
            METHOD_HOTP => {
                let counter = c.read_u64().map_err(|_| TlvError::BadMethodRecord(kind))?;
                let current_fails = c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?;
                let max_fails = c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?;
                let digits = c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?;
                let secret_len = usize::from(c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?);
                let slot = c.read_slice(HOTP_SECRET_SLOT).map_err(|_| TlvError::BadMethodRecord(kind))?;
                if secret_len > HOTP_SECRET_SLOT {
                    return Err(TlvError::BadMethodRecord(kind));
                }
                Self::Hotp {
                    counter,
                    current_fails,
                    max_fails,
                    digits,
                    secret: slot[..secret_len].to_vec(),
                }
            }
            METHOD_PASSWD => {
                let current_fails = c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?;
                let max_fails = c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?;
                let hash_len = usize::from(c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?);
                let hash = c.read_slice(hash_len).map_err(|_| TlvError::BadMethodRecord(kind))?.to_vec();
                Self::Password { current_fails, max_fails, hash }
            }
            METHOD_GLOBAL_TRIES => {
                let tries = c.read_u8().map_err(|_| TlvError::BadMethodRecord(kind))?;
                Self::GlobalTries { tries }
            }
            other => return Err(TlvError::BadMethodRecord(other)),
        };
        if c.remaining() != 0 {
            return Err(TlvError::BadMethodRecord(kind));
        }
        Ok(method)
    }
}

/// A user authentication context: header plus method records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthContext {
    /// Context format version.
    pub version: u8,
    /// The user this context belongs to.
    pub user_id: [u8; 8],
    /// Context flags.
    pub flags: u32,
    /// Failed attempts across all methods.
    pub total_fails: u8,
    /// Allowed attempts across all methods.
    pub max_fails: u8,
    /// Enrolled methods.
    pub methods: Vec<AuthMethod>,
}

impl AuthContext {
    /// Serialize to the flat record format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TlvError> {
        let mut out = Vec::with_capacity(15 + 32 * self.methods.len());
        out.push(self.version);
        out.extend_from_slice(&self.user_id);
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.push(self.total_fails);
        out.push(self.max_fails);
        for m in &self.methods {
            m.write(&mut out)?;
        }
        Ok(out)
    }

    /// Parse the flat record format. Strict: unknown method types and
    /// trailing garbage are errors.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TlvError> {
        let mut c = Cursor::new(data);
        let version = c.read_u8()?;
        let user_id = c.read_array::<8>()?;
        let flags = c.read_u32()?;
        let total_fails = c.read_u8()?;
        let max_fails = c.read_u8()?;

        let mut methods = Vec::new();
        while c.remaining() > 0 {
            let kind = c.read_u8()?;
            let len = usize::from(c.read_u16()?);
            let body = c.read_slice(len)?;
            methods.push(AuthMethod::read(kind, body)?);
        }
        Ok(Self { version, user_id, flags, total_fails, max_fails, methods })
    }
}

// ─── Builders ────────────────────────────────────────────────────────────────

/// Which verification operation a request performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthOp {
    /// HOTP code verification (`0xA5`).
    Hotp,
    /// Password verification (`0xA4`).
    Password,
}

impl AuthOp {
    /// The outer TLV tag of this operation.
    pub fn tag(self) -> u8 {
        match self {
            Self::Hotp     => TAG_HOTP_VERIFY,
            Self::Password => TAG_PASSWD_VERIFY,
        }
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
}

/// Build the enrolment payload for a fresh context.
///
/// The context is shipped twice: once protected under throwaway keys
/// (`0xA3`) and once in the clear (`0xA8`). The HSM re-protects it under
/// its own keys; ours are generated here and forgotten on return.
pub fn build_new_context(ctx: &AuthContext) -> Result<Vec<u8>, TlvError> {
    let plain = ctx.to_bytes()?;

    let enc_key = random_key();
    let mac_key = random_key();
    let mut protected = cbc::encrypt(&enc_key, &ZERO_IV, &plain, Padding::Pkcs7)?;
    let tag = cbc::cbc_mac(&mac_key, &protected)?;
    protected.extend_from_slice(&tag);

    let mut out = Vec::with_capacity(6 + protected.len() + plain.len());
    write_tlv(&mut out, TAG_USER_CTX, &protected);
    write_tlv(&mut out, TAG_NEW_CTX, &plain);
    Ok(out)
}

/// Build a verification payload: the stored context plus `userId ‖ code`.
pub fn build_auth(user_id: &[u8; 8], code: &[u8], user_ctx: &[u8], op: AuthOp) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + user_ctx.len() + 8 + code.len());
    write_tlv(&mut out, TAG_USER_CTX, user_ctx);
    let mut body = Vec::with_capacity(8 + code.len());
    body.extend_from_slice(user_id);
    body.extend_from_slice(code);
    write_tlv(&mut out, op.tag(), &body);
    out
}

/// Build a context-update payload carrying one replacement method record.
pub fn build_update(user_id: &[u8; 8], user_ctx: &[u8], method: &AuthMethod) -> Result<Vec<u8>, TlvError> {
    let mut record = Vec::new();
    method.write(&mut record)?;

    let mut out = Vec::with_capacity(6 + user_ctx.len() + 8 + record.len());
    write_tlv(&mut out, TAG_USER_CTX, user_ctx);
    let mut body = Vec::with_capacity(8 + record.len());
    body.extend_from_slice(user_id);
    body.extend_from_slice(&record);
    write_tlv(&mut out, TAG_UPDATE_CTX, &body);
    Ok(out)
}

// ─── Response parsing ────────────────────────────────────────────────────────

/// A parsed auth reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthResponse {
    /// HSM status word from the final 16 bits.
    pub status: u16,
    /// User id echoed by the HSM.
    pub user_id: [u8; 8],
    /// The fresh context to persist, also on failed verification.
    pub new_ctx: Vec<u8>,
    /// Per-method return blocks, `(type, body)`.
    pub method_data: Vec<(u8, Vec<u8>)>,
    /// True once the reply parsed cleanly; the caller must then store
    /// `new_ctx`. Stays false on any parse failure.
    pub should_update_ctx: bool,
}

/// Parse an auth reply for the operation we sent (`op_tag` = the outer tag
/// of that operation, e.g. [`TAG_HOTP_VERIFY`]).
///
/// Layout: `[A3 ‖ len ‖ newCtx] [op ‖ len ‖ userId ‖ method blocks…] status(2B)`.
/// Unknown outer tags, the wrong op tag, or trailing bytes are all fatal.
pub fn parse_auth_response(data: &[u8], op_tag: u8) -> Result<AuthResponse, TlvError> {
    let mut c = Cursor::new(data);
    let new_ctx = c.read_tlv(TAG_USER_CTX)?.to_vec();

    let inner = c.read_tlv(op_tag)?;
    let mut ic = Cursor::new(inner);
    let user_id = ic.read_array::<8>()?;
    let mut method_data = Vec::new();
    while ic.remaining() > 0 {
        let kind = ic.read_u8()?;
        let len = usize::from(ic.read_u16()?);
        method_data.push((kind, ic.read_slice(len)?.to_vec()));
    }

    let status = c.read_u16()?;
    if c.remaining() != 0 {
        return Err(TlvError::TrailingBytes(c.remaining()));
    }

    Ok(AuthResponse { status, user_id, new_ctx, method_data, should_update_ctx: true })
}
