//! Filling a server-issued UO template with client keys.
//!
//! The template arrives partly filled: key slots are addressed by bit
//! offset, a flag field tells the HSM which keys it should still generate,
//! and everything past `encryptionoffset` must reach the HSM encrypted
//! under fresh transport keys. Those transport keys travel wrapped under
//! the service's RSA import key.

use std::fmt;

use uolink_crypto::cbc::{self, CbcError};
use uolink_crypto::rsa::{KeyError, PublicKey};
use uolink_crypto::{padding, random_key, BitString, Padding};

use crate::envelope::{TemplateImportKey, TemplateRecord};

/// Outer tag of the RSA-wrapped transport keys.
pub const TAG_WRAPPED_KEYS: u8 = 0xa1;
/// Outer tag of the protected template image.
pub const TAG_PROTECTED_TEMPLATE: u8 = 0xa2;

/// Flag bit: HSM should generate the communication keys.
const FLAG_GENERATE_COMM: u8 = 1 << 3;
/// Flag bit: HSM should generate the application key.
const FLAG_GENERATE_APP: u8 = 1 << 4;

const ZERO_IV: [u8; 16] = [0u8; 16];

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors from [`fill`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FillError {
    /// Template blob is not valid hex, or offsets point outside it.
    BadBlob,
    /// A supplied key does not match its slot width.
    SlotLengthMismatch {
        /// Slot name from the template.
        slot: String,
        /// Slot width in bits.
        expected_bits: usize,
        /// Supplied key width in bits.
        got_bits: usize,
    },
    /// `objectid` is not 8 hex chars.
    BadObjectId,
    /// The template offers no usable RSA import key.
    NoImportKey,
    /// The chosen import key could not be parsed or used.
    ImportKey(KeyError),
    /// The crypto layer rejected the input.
    Crypto(CbcError),
}

impl fmt::Display for FillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBlob => write!(f, "template blob malformed"),
            Self::SlotLengthMismatch { slot, expected_bits, got_bits } => {
                write!(f, "key for slot {slot:?} is {got_bits} bits, slot holds {expected_bits}")
            }
            Self::BadObjectId   => write!(f, "objectid is not a 32-bit hex value"),
            Self::NoImportKey   => write!(f, "no RSA import key offered"),
            Self::ImportKey(e)  => write!(f, "import key: {e}"),
            Self::Crypto(e)     => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for FillError {}

impl From<CbcError> for FillError {
    fn from(e: CbcError) -> Self { Self::Crypto(e) }
}

// ─── Client keys ─────────────────────────────────────────────────────────────

/// The client-chosen keys to splice into a template, addressed by slot name.
#[derive(Clone, Debug, Default)]
pub struct TemplateKeys {
    entries: Vec<(String, Vec<u8>)>,
}

impl TemplateKeys {
    /// No keys; every slot stays server-generated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key for `slot`, replacing any previous value.
    pub fn insert(&mut self, slot: impl Into<String>, key: impl Into<Vec<u8>>) {
        let slot = slot.into();
        self.entries.retain(|(s, _)| *s != slot);
        self.entries.push((slot, key.into()));
    }

    /// Builder-style [`TemplateKeys::insert`].
    pub fn with(mut self, slot: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.insert(slot, key);
        self
    }

    /// The key supplied for `slot`, if any.
    pub fn get(&self, slot: &str) -> Option<&[u8]> {
        self.entries.iter().find(|(s, _)| s == slot).map(|(_, k)| k.as_slice())
    }

    /// True when an application key was supplied.
    pub fn has_app_key(&self) -> bool {
        self.get("app").is_some() || self.get("appkey").is_some()
    }
}

// ─── Filler ──────────────────────────────────────────────────────────────────

/// A filled template ready for `CreateUserObject`.
#[derive(Clone, Debug)]
pub struct FilledTemplate {
    /// `[A1 ‖ len ‖ wrapped keys] [A2 ‖ len ‖ protected template]`.
    pub blob: Vec<u8>,
    /// Import key id to echo in the create call.
    pub import_key_id: u32,
    /// Object id parsed from the template.
    pub object_id: u32,
}

/// Splice `patch` over `bits` starting at bit `offset`.
fn splice(bits: &BitString, offset: usize, patch: &BitString) -> BitString {
    bits.slice(0, offset)
        .concat(patch)
        .concat(&bits.slice(offset + patch.bit_len(), bits.bit_len()))
}

fn choose_import_key(keys: &[TemplateImportKey]) -> Result<&TemplateImportKey, FillError> {
    keys.iter().find(|k| k.kind == "rsa2048")
        .or_else(|| keys.iter().find(|k| k.kind == "rsa1024"))
        .ok_or(FillError::NoImportKey)
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
}

/// Patch client keys into `template`, flip the generation flags, re-encrypt
/// the protected section under fresh transport keys, and wrap those keys
/// under the template's import key.
pub fn fill(template: &TemplateRecord, keys: &TemplateKeys) -> Result<FilledTemplate, FillError> {
    let mut bits = BitString::from_hex(&template.template).ok_or(FillError::BadBlob)?;

    // 1. Key slots.
    for slot in &template.keyoffsets {
        let Some(key) = keys.get(&slot.slot) else { continue };
        if key.len() * 8 != slot.length {
            return Err(FillError::SlotLengthMismatch {
                slot: slot.slot.clone(),
                expected_bits: slot.length,
                got_bits: key.len() * 8,
            });
        }
        if slot.offset + slot.length > bits.bit_len() {
            return Err(FillError::BadBlob);
        }
        bits = splice(&bits, slot.offset, &BitString::from_bytes(key));
        log::debug!("patched template slot {:?} at bit {}", slot.slot, slot.offset);
    }

    // 2. Generation flags: the byte at flagoffset+8..flagoffset+16.
    let flag_lo = template.flagoffset + 8;
    if flag_lo + 8 > bits.bit_len() {
        return Err(FillError::BadBlob);
    }
    let mut flag = bits.extract(flag_lo, 8) as u8;
    flag &= !FLAG_GENERATE_COMM;
    if keys.has_app_key() {
        flag &= !FLAG_GENERATE_APP;
    }
    bits = splice(&bits, flag_lo, &BitString::from_bytes(&[flag]));

    // 3. Partition at the encryption boundary.
    if template.encryptionoffset > bits.bit_len() || template.encryptionoffset % 8 != 0 {
        return Err(FillError::BadBlob);
    }
    let prefix = bits.slice(0, template.encryptionoffset).to_bytes();
    let suffix = bits.slice(template.encryptionoffset, bits.bit_len()).to_bytes();

    // 4. Protect the suffix under fresh transport keys.
    let tek = random_key();
    let tmk = random_key();
    let suffix_ct = cbc::encrypt(&tek, &ZERO_IV, &suffix, Padding::Pkcs7)?;

    // 5. MAC over the padded plaintext-prefix ‖ ciphertext image.
    let mut inner = prefix;
    inner.extend_from_slice(&suffix_ct);
    let mut inner = padding::pkcs7_pad(inner);
    let mac = cbc::cbc_mac(&tmk, &inner)?;
    inner.extend_from_slice(&mac);

    // 6. Wrap objectid ‖ TEK ‖ TMK under the import key.
    let import = choose_import_key(&template.importkeys)?;
    let public_key = PublicKey::from_tlv_hex(&import.publickey).map_err(FillError::ImportKey)?;
    let object_id_bytes: [u8; 4] = hex::decode(template.objectid.trim())
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or(FillError::BadObjectId)?;
    let mut wrap_input = Vec::with_capacity(4 + 64);
    wrap_input.extend_from_slice(&object_id_bytes);
    wrap_input.extend_from_slice(&tek);
    wrap_input.extend_from_slice(&tmk);
    let wrapped = public_key.wrap(&wrap_input).map_err(FillError::ImportKey)?;

    // 7. Final two-block blob.
    let mut blob = Vec::with_capacity(6 + wrapped.len() + inner.len());
    write_tlv(&mut blob, TAG_WRAPPED_KEYS, &wrapped);
    write_tlv(&mut blob, TAG_PROTECTED_TEMPLATE, &inner);

    Ok(FilledTemplate {
        blob,
        import_key_id: import.id,
        object_id: u32::from_be_bytes(object_id_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::KeyOffset;

    fn template_with(blob_bytes: usize, keyoffsets: Vec<KeyOffset>) -> TemplateRecord {
        TemplateRecord {
            objectid: "0000ee01".into(),
            template: hex::encode(vec![0xeeu8; blob_bytes]),
            encryptionoffset: 32,
            flagoffset: 256,
            keyoffsets,
            importkeys: vec![TemplateImportKey {
                id: 7,
                kind: "rsa2048".into(),
                // e = 1 keeps the wrap equal to its padded input in tests
                publickey: identity_key_hex(256),
            }],
            authorization: None,
        }
    }

    fn identity_key_hex(modulus_len: usize) -> String {
        format!("81000101 820{:03x} {}", modulus_len, "ff".repeat(modulus_len))
    }

    #[test]
    fn slot_length_mismatch_is_rejected() {
        let tpl = template_with(40, vec![KeyOffset { slot: "commk".into(), offset: 0, length: 256, tlvtype: None }]);
        let keys = TemplateKeys::new().with("commk", vec![0u8; 16]);
        assert!(matches!(fill(&tpl, &keys), Err(FillError::SlotLengthMismatch { .. })));
    }

    #[test]
    fn unsupplied_slots_are_left_alone() {
        let tpl = template_with(40, vec![KeyOffset { slot: "commk".into(), offset: 0, length: 256, tlvtype: None }]);
        let filled = fill(&tpl, &TemplateKeys::new()).unwrap();
        assert_eq!(filled.import_key_id, 7);
        assert_eq!(filled.object_id, 0xee01);
    }

    #[test]
    fn prefers_rsa2048() {
        let mut tpl = template_with(40, Vec::new());
        tpl.importkeys.insert(0, TemplateImportKey {
            id: 3,
            kind: "rsa1024".into(),
            publickey: identity_key_hex(128),
        });
        assert_eq!(fill(&tpl, &TemplateKeys::new()).unwrap().import_key_id, 7);
        tpl.importkeys.remove(1);
        assert_eq!(fill(&tpl, &TemplateKeys::new()).unwrap().import_key_id, 3);
    }

    #[test]
    fn no_import_key_is_an_error() {
        let mut tpl = template_with(40, Vec::new());
        tpl.importkeys.clear();
        assert!(matches!(fill(&tpl, &TemplateKeys::new()), Err(FillError::NoImportKey)));
    }
}
