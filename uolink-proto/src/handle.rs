//! UO handles — the printable token addressing a User Object.
//!
//! Format: `apiKey ‖ "00" ‖ uoId(8 hex) ‖ "00" ‖ uoType(8 hex)`. The type
//! section may be absent, in which case it defaults to 0.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// `uoType` bit set when the client supplied the communication keys.
pub const TYPE_COMM_KEYS_CLIENT: u32 = 1 << 20;
/// `uoType` bit set when the client supplied the application key.
pub const TYPE_APP_KEY_CLIENT: u32 = 1 << 21;

/// Capability identifiers carried in the low bits of `uoType`.
pub mod kind {
    /// AES-256 encrypt under the app key.
    pub const PLAINAES: u32 = 0x0001;
    /// AES-256 decrypt under the app key.
    pub const PLAINAESDECRYPT: u32 = 0x0002;
    /// RSA-1024 decrypt.
    pub const RSA1024DECRYPT: u32 = 0x0003;
    /// RSA-2048 decrypt.
    pub const RSA2048DECRYPT: u32 = 0x0004;
    /// HMAC computation.
    pub const HMAC: u32 = 0x0005;
    /// Tokenisation.
    pub const TOKENIZE: u32 = 0x0006;
    /// HOTP verification.
    pub const AUTH_HOTP: u32 = 0x0007;
    /// Password verification.
    pub const AUTH_PASSWD: u32 = 0x0008;
    /// Create a fresh user auth context.
    pub const AUTH_NEW_USER_CTX: u32 = 0x0009;
    /// Update an existing user auth context.
    pub const AUTH_UPDATE_USER_CTX: u32 = 0x000a;
}

/// Errors from [`UoHandle::from_str`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HandleError {
    /// The token does not match the handle grammar.
    Malformed,
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "handle does not match apiKey00id[00type]"),
        }
    }
}
impl std::error::Error for HandleError {}

/// A parsed UO handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UoHandle {
    /// Opaque API key (alphanumeric plus `_` and `-`).
    pub api_key: String,
    /// 32-bit object id.
    pub uo_id:   u32,
    /// 32-bit type word: capability id plus the client-key flag bits.
    pub uo_type: u32,
}

fn handle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_-]+?)00([0-9a-f]{8})(?:00([0-9a-f]{8}))?$")
            .expect("handle pattern compiles")
    })
}

impl UoHandle {
    /// Build a handle from its parts.
    pub fn new(api_key: impl Into<String>, uo_id: u32, uo_type: u32) -> Self {
        Self { api_key: api_key.into(), uo_id, uo_type }
    }

    /// True when the comm keys were provided by the client.
    pub fn client_comm_keys(&self) -> bool {
        self.uo_type & TYPE_COMM_KEYS_CLIENT != 0
    }

    /// True when the app key was provided by the client.
    pub fn client_app_key(&self) -> bool {
        self.uo_type & TYPE_APP_KEY_CLIENT != 0
    }
}

impl FromStr for UoHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = handle_re().captures(s).ok_or(HandleError::Malformed)?;
        let api_key = caps[1].to_string();
        let uo_id = u32::from_str_radix(&caps[2], 16).map_err(|_| HandleError::Malformed)?;
        let uo_type = match caps.get(3) {
            Some(t) => u32::from_str_radix(t.as_str(), 16).map_err(|_| HandleError::Malformed)?,
            None    => 0,
        };
        Ok(Self { api_key, uo_id, uo_type })
    }
}

impl fmt::Display for UoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}00{:08x}00{:08x}", self.api_key, self.uo_id, self.uo_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let h = UoHandle::new("TEST_API-key", 0xee01, kind::PLAINAES | TYPE_COMM_KEYS_CLIENT);
        let parsed: UoHandle = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
        assert!(parsed.client_comm_keys());
        assert!(!parsed.client_app_key());
    }

    #[test]
    fn type_section_defaults_to_zero() {
        let h: UoHandle = "abc0000000ee01".parse().unwrap();
        assert_eq!(h.api_key, "abc");
        assert_eq!(h.uo_id, 0xee01);
        assert_eq!(h.uo_type, 0);
    }

    #[test]
    fn shortest_api_key_wins() {
        // The api-key match is lazy, so the first "00" that leaves a valid
        // 8-hex id terminates it.
        let h: UoHandle = "a000000000100aabbccdd".parse().unwrap();
        assert_eq!(h.api_key, "a");
        assert_eq!(h.uo_id, 0x00000001);
        assert_eq!(h.uo_type, 0xaabbccdd);
    }

    #[test]
    fn malformed_handles_are_rejected() {
        assert!("".parse::<UoHandle>().is_err());
        assert!("justakey".parse::<UoHandle>().is_err());
        assert!("key00zzzzzzzz".parse::<UoHandle>().is_err());
        assert!("key0012345".parse::<UoHandle>().is_err());
        // uppercase hex is not part of the grammar
        assert!("key00AABBCCDD".parse::<UoHandle>().is_err());
    }
}
