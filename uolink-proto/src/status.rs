//! HSM status words and the library's local error codes.

/// Operation completed.
pub const SW_STAT_OK: u16 = 0x9000;

// ─── 0x80xx wrong-data class ─────────────────────────────────────────────────

/// Request TLV could not be parsed.
pub const SW_INVALID_TLV_FORMAT: u16 = 0x804c;
/// Decrypted request had invalid padding.
pub const SW_WRONG_PADDING: u16 = 0x803d;
/// The API key in the handle is unknown.
pub const SW_INVALID_API_KEY: u16 = 0x8068;

// ─── 0xA0xx user-auth security class ─────────────────────────────────────────

/// Password verification failed.
pub const SW_PASSWD_WRONG: u16 = 0xa065;
/// Too many failed attempts across all methods.
pub const SW_AUTH_TOO_MANY_TRIES: u16 = 0xa066;
/// HOTP code did not verify.
pub const SW_HOTP_WRONG_CODE: u16 = 0xa0b0;
/// Too many failed HOTP attempts.
pub const SW_HOTP_TOO_MANY_TRIES: u16 = 0xa0b1;
/// The user id in the request does not match the context.
pub const SW_AUTH_MISMATCHED_USER: u16 = 0xa0b6;

/// Generic failure class.
pub const SW_GENERIC_ERROR: u16 = 0x6f00;

// ─── Local codes (never sent by the HSM) ─────────────────────────────────────

/// Transport failure or timeout.
pub const LOCAL_CONNECTION: u16 = 0x1;
/// Valid envelope, HSM returned a non-OK status.
pub const LOCAL_RESPONSE_FAILED: u16 = 0x2;
/// Envelope or frame could not be parsed.
pub const LOCAL_PARSE_FAILED: u16 = 0x3;

/// Coarse grouping of HSM status words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusClass {
    /// `0x9000`.
    Ok,
    /// `0x80xx`: the request's data was malformed.
    WrongData,
    /// `0xA0xx`: a user-auth security condition.
    Security,
    /// `0x6Fxx`: unspecified failure.
    Generic,
    /// Anything else.
    Other,
}

/// Classify a status word.
pub fn class_of(status: u16) -> StatusClass {
    match status {
        SW_STAT_OK        => StatusClass::Ok,
        s if s & 0xff00 == 0x8000 => StatusClass::WrongData,
        s if s & 0xff00 == 0xa000 => StatusClass::Security,
        s if s & 0xff00 == 0x6f00 => StatusClass::Generic,
        _ => StatusClass::Other,
    }
}

/// True when `status` is the OK word.
pub fn is_ok(status: u16) -> bool {
    status == SW_STAT_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(class_of(SW_STAT_OK), StatusClass::Ok);
        assert_eq!(class_of(SW_WRONG_PADDING), StatusClass::WrongData);
        assert_eq!(class_of(SW_HOTP_WRONG_CODE), StatusClass::Security);
        assert_eq!(class_of(SW_GENERIC_ERROR), StatusClass::Generic);
        assert_eq!(class_of(0x1234), StatusClass::Other);
    }
}
