//! Error types for uolink-client.
//!
//! The taxonomy follows the service's failure classes: caller misuse
//! (`Invalid`), broken wire/crypto invariants (`Corrupt`), transport
//! trouble (`Connection`), an HSM-reported failure (`ResponseFailed`),
//! and caller-driven cancellation (`Cancelled`).

use std::fmt;

use uolink_crypto::cbc::CbcError;
use uolink_crypto::rsa::KeyError;
use uolink_proto::auth_tlv::TlvError;
use uolink_proto::handle::HandleError;
use uolink_proto::process_data::{BuildError, ParseError};
use uolink_proto::status;
use uolink_proto::template::FillError;

// ─── CorruptKind ─────────────────────────────────────────────────────────────

/// What exactly broke when a reply failed validation.
#[derive(Debug)]
pub enum CorruptKind {
    /// The ProcessData frame failed a structural or crypto check.
    Wire(ParseError),
    /// The auth TLV sub-protocol failed to parse.
    Tlv(TlvError),
    /// Template filling failed.
    Template(FillError),
    /// A handle string did not parse.
    Handle(HandleError),
    /// An RSA import key could not be used.
    ImportKey(KeyError),
    /// A crypto primitive rejected its input outside the wire codec.
    Crypto(CbcError),
    /// The envelope was not the JSON we expect.
    Json(String),
    /// The reply echoed a different UOid than the request.
    UoidMismatch {
        /// UOid we called.
        expected: u32,
        /// UOid the reply carried.
        got: u32,
    },
    /// The demangled reply nonce does not match the request nonce.
    NonceMismatch,
}

impl fmt::Display for CorruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e)      => write!(f, "{e}"),
            Self::Tlv(e)       => write!(f, "auth TLV: {e}"),
            Self::Template(e)  => write!(f, "template: {e}"),
            Self::Handle(e)    => write!(f, "handle: {e}"),
            Self::ImportKey(e) => write!(f, "import key: {e}"),
            Self::Crypto(e)    => write!(f, "{e}"),
            Self::Json(e)      => write!(f, "envelope JSON: {e}"),
            Self::UoidMismatch { expected, got } => {
                write!(f, "reply for UOid {got:#010x}, expected {expected:#010x}")
            }
            Self::NonceMismatch => write!(f, "reply nonce does not match the request"),
        }
    }
}

// ─── UoError ─────────────────────────────────────────────────────────────────

/// The error type returned by every [`crate::UoClient`] method.
#[derive(Debug)]
pub enum UoError {
    /// Caller misuse: missing field, bad hex, oversized payload.
    Invalid(String),
    /// A wire or crypto invariant was broken; no partial data is returned.
    Corrupt(CorruptKind),
    /// HTTP transport failure, non-2xx response, or timeout.
    Connection(reqwest::Error),
    /// Valid envelope but the HSM returned a non-OK status.
    ResponseFailed {
        /// The status word.
        status: u16,
        /// The envelope's `statusdetail`, when present.
        detail: Option<String>,
    },
    /// The operation's retry handler was cancelled.
    Cancelled,
}

impl fmt::Display for UoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(s)     => write!(f, "invalid request: {s}"),
            Self::Corrupt(k)     => write!(f, "corrupt response: {k}"),
            Self::Connection(e)  => write!(f, "connection: {e}"),
            Self::ResponseFailed { status, detail } => {
                write!(f, "HSM status {status:#06x}")?;
                if let Some(d) = detail {
                    write!(f, " ({d})")?;
                }
                Ok(())
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
impl std::error::Error for UoError {}

impl UoError {
    /// The legacy local error code, for callers that log numeric codes.
    pub fn local_code(&self) -> Option<u16> {
        match self {
            Self::Connection(_)         => Some(status::LOCAL_CONNECTION),
            Self::ResponseFailed { .. } => Some(status::LOCAL_RESPONSE_FAILED),
            Self::Corrupt(_)            => Some(status::LOCAL_PARSE_FAILED),
            Self::Invalid(_) | Self::Cancelled => None,
        }
    }

    /// True for failures the provisioning orchestrator retries.
    ///
    /// `Invalid` and `ResponseFailed` are deterministic verdicts and
    /// surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Corrupt(_))
    }

    /// The HSM status word, when the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ResponseFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ParseError> for UoError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::ErrorStatus { code, detail } => {
                Self::ResponseFailed { status: code, detail }
            }
            other => Self::Corrupt(CorruptKind::Wire(other)),
        }
    }
}

impl From<BuildError> for UoError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::PlainTooLarge(n) => {
                Self::Invalid(format!("plain data of {n} bytes exceeds the 16-bit length field"))
            }
            BuildError::Crypto(c) => Self::Corrupt(CorruptKind::Crypto(c)),
        }
    }
}

impl From<TlvError> for UoError {
    fn from(e: TlvError) -> Self { Self::Corrupt(CorruptKind::Tlv(e)) }
}

impl From<FillError> for UoError {
    fn from(e: FillError) -> Self {
        match e {
            FillError::SlotLengthMismatch { slot, expected_bits, got_bits } => Self::Invalid(
                format!("key for slot {slot:?} is {got_bits} bits, slot holds {expected_bits}"),
            ),
            other => Self::Corrupt(CorruptKind::Template(other)),
        }
    }
}

impl From<HandleError> for UoError {
    fn from(e: HandleError) -> Self { Self::Corrupt(CorruptKind::Handle(e)) }
}

impl From<reqwest::Error> for UoError {
    fn from(e: reqwest::Error) -> Self { Self::Connection(e) }
}

// ─── ProvisionError ──────────────────────────────────────────────────────────

/// Which stage of the two-call provisioning sequence failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// `GetUserObjectTemplate`.
    Template,
    /// Template filling and `CreateUserObject`.
    Import,
}

impl Phase {
    /// Numeric phase tag (1 = template, 2 = import).
    pub fn code(self) -> u8 {
        match self {
            Self::Template => 1,
            Self::Import   => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Import   => write!(f, "import"),
        }
    }
}

/// A provisioning failure tagged with the phase it happened in.
#[derive(Debug)]
pub struct ProvisionError {
    /// The failing phase.
    pub phase: Phase,
    /// The underlying failure (the last one, when retries were exhausted).
    pub source: UoError,
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provisioning phase {} ({}): {}", self.phase.code(), self.phase, self.source)
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_maps_to_response_failed() {
        let e: UoError = ParseError::ErrorStatus { code: 0xa0b0, detail: None }.into();
        assert_eq!(e.status_code(), Some(0xa0b0));
        assert_eq!(e.local_code(), Some(status::LOCAL_RESPONSE_FAILED));
        assert!(!e.is_retryable());
    }

    #[test]
    fn mac_mismatch_is_retryable_corrupt() {
        let e: UoError = ParseError::MacMismatch.into();
        assert_eq!(e.local_code(), Some(status::LOCAL_PARSE_FAILED));
        assert!(e.is_retryable());
    }

    #[test]
    fn oversized_plain_data_is_invalid() {
        let e: UoError = BuildError::PlainTooLarge(70000).into();
        assert!(matches!(e, UoError::Invalid(_)));
        assert_eq!(e.local_code(), None);
    }
}
