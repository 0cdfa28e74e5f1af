//! JSON records exchanged with the service.
//!
//! Every response is wrapped in the same envelope; `result` is
//! call-specific and decoded by the caller.

use serde::{Deserialize, Serialize};

/// The outer JSON of every response.
///
/// ```json
/// {"status":"9000","statusdetail":"(OK)SW_STAT_OK","function":"ProcessData",
///  "result":"…","version":"1.0"}
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct ResponseEnvelope {
    /// Status word as a hex string.
    pub status: String,
    /// Human-readable status, e.g. `(OK)SW_STAT_OK`.
    #[serde(default)]
    pub statusdetail: Option<String>,
    /// Echo of the called function.
    #[serde(default)]
    pub function: Option<String>,
    /// Call-specific payload.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
}

impl ResponseEnvelope {
    /// The status word, or `None` when the field is not valid hex.
    pub fn status_code(&self) -> Option<u16> {
        u16::from_str_radix(self.status.trim(), 16).ok()
    }
}

// ─── GetUserObjectTemplate ───────────────────────────────────────────────────

/// Key-generation strategies requested for each slot of a new UO.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateGeneration {
    /// Communication keys: 1 = client-provided.
    pub commkey: u32,
    /// Billing key.
    pub billingkey: u32,
    /// Application key.
    pub appkey: u32,
}

/// Body of a `GetUserObjectTemplate` call, sent verbatim.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateRequest {
    /// Template format version.
    pub format: u32,
    /// Protocol version.
    pub protocol: u32,
    /// Requested UO type word, 8 hex chars.
    #[serde(rename = "type")]
    pub uo_type: String,
    /// Target environment (`dev`, `test`, `prod`).
    pub environment: String,
    /// Transaction-rate class.
    pub maxtps: String,
    /// How much compute the UO may claim.
    pub core: String,
    /// Context persistence class.
    pub persistence: String,
    /// Scheduling priority.
    pub priority: String,
    /// Tenant separation class.
    pub separation: String,
    /// Whether the UO participates in billing-context rotation.
    pub bcr: String,
    /// Unlimited-use flag.
    pub unlimited: String,
    /// Client IV support.
    pub clientiv: String,
    /// Client diversification support.
    pub clientdiv: String,
    /// Resource pool.
    pub resource: String,
    /// Credit limit for metered objects.
    pub credit: u32,
    /// Per-slot generation strategies.
    pub generation: TemplateGeneration,
}

impl TemplateRequest {
    /// A sensible request for a client-keyed UO of the given type.
    pub fn client_keyed(uo_type: u32) -> Self {
        Self {
            format: 1,
            protocol: 1,
            uo_type: format!("{uo_type:08x}"),
            environment: "dev".into(),
            maxtps: "unlimited".into(),
            core: "empty".into(),
            persistence: "one_minute".into(),
            priority: "default".into(),
            separation: "time".into(),
            bcr: "yes".into(),
            unlimited: "yes".into(),
            clientiv: "yes".into(),
            clientdiv: "no".into(),
            resource: "global".into(),
            credit: 32767,
            generation: TemplateGeneration { commkey: 1, billingkey: 0, appkey: 0 },
        }
    }
}

/// One patchable key slot inside a template blob.
#[derive(Clone, Debug, Deserialize)]
pub struct KeyOffset {
    /// Slot name, e.g. `comenc`, `commac`, `commk`, `app`, `billing`.
    #[serde(rename = "type")]
    pub slot: String,
    /// Bit offset of the slot inside the blob.
    pub offset: usize,
    /// Slot width in bits.
    pub length: usize,
    /// TLV type the slot is stored under, when the server reports it.
    #[serde(default)]
    pub tlvtype: Option<u8>,
}

/// An RSA import key offered inside a template.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateImportKey {
    /// Server-side key id, echoed back on `CreateUserObject`.
    pub id: u32,
    /// `rsa1024` or `rsa2048`.
    #[serde(rename = "type")]
    pub kind: String,
    /// TLV-encoded public key, hex with optional spaces.
    pub publickey: String,
}

/// `GetUserObjectTemplate` result.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateRecord {
    /// Object id to embed in the wrapped transport keys, 8 hex chars.
    pub objectid: String,
    /// The raw template image, hex.
    pub template: String,
    /// Bit offset where the encrypted section of the blob starts.
    pub encryptionoffset: usize,
    /// Bit offset of the generation-flags field.
    pub flagoffset: usize,
    /// Patchable key slots.
    pub keyoffsets: Vec<KeyOffset>,
    /// Import keys offered for wrapping the transport keys.
    pub importkeys: Vec<TemplateImportKey>,
    /// Opaque authorization token, echoed on `CreateUserObject`.
    #[serde(default)]
    pub authorization: Option<String>,
}

// ─── CreateUserObject ────────────────────────────────────────────────────────

/// Body of a `CreateUserObject` call.
#[derive(Clone, Debug, Serialize)]
pub struct CreateRequest {
    /// Object id from the template.
    pub objectid: String,
    /// Chosen import key id.
    pub importkey: u32,
    /// The filled, re-encrypted template, hex.
    pub object: String,
    /// Authorization token from the template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

/// `CreateUserObject` result.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateResult {
    /// Handle of the newly created UO.
    pub handle: String,
    /// Public part for RSA UOs.
    #[serde(default)]
    pub publickey: Option<String>,
}

// ─── GetImportPublicKey ──────────────────────────────────────────────────────

/// One record of a `GetImportPublicKey` result.
#[derive(Clone, Debug, Deserialize)]
pub struct ImportKeyRecord {
    /// Server-side key id.
    pub id: u32,
    /// Key algorithm, `rsa`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional certificate, hex.
    #[serde(default)]
    pub certificate: Option<String>,
    /// TLV-encoded public key, hex with optional spaces.
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_status_parses_as_hex() {
        let env: ResponseEnvelope = serde_json::from_str(
            r#"{"status":"9000","statusdetail":"(OK)SW_STAT_OK","function":"ProcessData","result":"00","version":"1.0"}"#,
        ).unwrap();
        assert_eq!(env.status_code(), Some(0x9000));

        let bad: ResponseEnvelope = serde_json::from_str(r#"{"status":"nope"}"#).unwrap();
        assert_eq!(bad.status_code(), None);
    }

    #[test]
    fn template_record_decodes() {
        let json = r#"{
            "objectid": "0000ee01",
            "template": "deadbeef",
            "encryptionoffset": 32,
            "flagoffset": 0,
            "keyoffsets": [{"type": "commk", "offset": 0, "length": 256}],
            "importkeys": [{"id": 1, "type": "rsa2048", "publickey": "81 0003 010001"}],
            "authorization": "auth-token"
        }"#;
        let rec: TemplateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.keyoffsets[0].slot, "commk");
        assert_eq!(rec.keyoffsets[0].length, 256);
        assert_eq!(rec.importkeys[0].kind, "rsa2048");
    }

    #[test]
    fn create_request_omits_missing_authorization() {
        let req = CreateRequest {
            objectid: "0000ee01".into(),
            importkey: 1,
            object: "a1".into(),
            authorization: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("authorization"));
    }
}
