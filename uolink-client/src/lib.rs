//! # uolink-client
//!
//! Async client for the UO service.
//!
//! ## Features
//! - `ProcessData` calls with the full authenticated-encryption envelope
//! - UO provisioning: template fetch → key splice → RSA-wrapped upload,
//!   with per-phase retry and cancellation
//! - HOTP / password user authentication riding on `ProcessData`
//! - Import-key listing
//! - Explicit configuration with documented override precedence

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
mod connector;
mod errors;
pub mod provision;
pub mod request;
pub mod retry;

pub use auth::{AuthOutcome, AuthSession, AuthState};
pub use config::{CallOptions, Configuration, Endpoint, HttpMethod, Scheme};
pub use errors::{CorruptKind, Phase, ProvisionError, UoError};
pub use provision::{CreateUo, ProvisionKeys};
pub use request::{ApiCall, ApiFunction, API_VERSION};
pub use retry::{RetryHandler, RetryPolicy};

use serde::de::DeserializeOwned;

use uolink_crypto::rsa::PublicKey;
use uolink_proto::envelope::{ImportKeyRecord, ResponseEnvelope, TemplateRecord, TemplateRequest};
use uolink_proto::handle::{self, UoHandle};
use uolink_proto::process_data::{self, ProcessDataRequest, RequestType};
use uolink_proto::status;

use crate::connector::Connector;

// ─── UserObject ──────────────────────────────────────────────────────────────

/// A provisioned User Object: its identity plus the transport keys
/// negotiated at creation.
#[derive(Clone)]
pub struct UserObject {
    /// 32-bit object id.
    pub uo_id: u32,
    /// 32-bit type word (capability + client-key flags).
    pub uo_type: u32,
    /// AES-256 key protecting request/response payloads.
    pub enc_key: [u8; 32],
    /// AES-256 key authenticating request/response payloads.
    pub mac_key: [u8; 32],
    /// The API key this UO lives under.
    pub api_key: String,
    /// Endpoint serving this UO's `ProcessData` calls.
    pub endpoint: Endpoint,
}

impl UserObject {
    /// Reconstruct a UO from a stored handle string and its keys.
    pub fn from_handle(
        handle: &str,
        enc_key: [u8; 32],
        mac_key: [u8; 32],
        endpoint: Endpoint,
    ) -> Result<Self, UoError> {
        let parsed: UoHandle = handle.parse()?;
        Ok(Self {
            uo_id: parsed.uo_id,
            uo_type: parsed.uo_type,
            enc_key,
            mac_key,
            api_key: parsed.api_key,
            endpoint,
        })
    }

    /// The UO's handle.
    pub fn handle(&self) -> UoHandle {
        UoHandle::new(self.api_key.clone(), self.uo_id, self.uo_type)
    }
}

impl std::fmt::Debug for UserObject {
    // keys stay out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserObject")
            .field("uo_id", &self.uo_id)
            .field("uo_type", &format_args!("{:#010x}", self.uo_type))
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

// ─── ImportKey ───────────────────────────────────────────────────────────────

/// A parsed RSA import key offered by the service.
#[derive(Clone, Debug)]
pub struct ImportKey {
    /// Server-side key id.
    pub id: u32,
    /// Key algorithm token from the record.
    pub kind: String,
    /// The usable public key.
    pub key: PublicKey,
}

// ─── UoClient ────────────────────────────────────────────────────────────────

/// The client. Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone, Debug)]
pub struct UoClient {
    cfg: Configuration,
    connector: Connector,
}

impl UoClient {
    /// Build a client for `cfg`.
    pub fn new(cfg: Configuration) -> Result<Self, UoError> {
        Ok(Self { cfg, connector: Connector::new()? })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &Configuration {
        &self.cfg
    }

    // ── ProcessData ────────────────────────────────────────────────────────

    /// Invoke `uo` with `user_data`, returning the decrypted payload.
    pub async fn process_data(
        &self,
        uo: &UserObject,
        req_type: RequestType,
        user_data: &[u8],
    ) -> Result<Vec<u8>, UoError> {
        self.process_data_with(uo, req_type, user_data, &CallOptions::default()).await
    }

    /// [`UoClient::process_data`] with per-call overrides.
    pub async fn process_data_with(
        &self,
        uo: &UserObject,
        req_type: RequestType,
        user_data: &[u8],
        opts: &CallOptions,
    ) -> Result<Vec<u8>, UoError> {
        let request = ProcessDataRequest {
            uo_id: uo.uo_id,
            req_type,
            plain_data: Vec::new(),
            user_data: user_data.to_vec(),
            nonce: opts.nonce,
        };
        let built = process_data::build(&request, &uo.enc_key, &uo.mac_key)?;

        let mut call = request::ApiCall::process_data(
            &self.cfg,
            opts,
            uo.handle().to_string(),
            &built.wire,
            built.nonce,
        );
        call.endpoint = uo.endpoint.clone();

        let env = self.connector.execute(&call).await?;
        let resp = process_data::parse(&env, &uo.enc_key, &uo.mac_key)?;

        // The freshness nonce is the correlation key; a mismatch means this
        // reply answers some other request.
        if resp.uo_id != uo.uo_id {
            return Err(UoError::Corrupt(CorruptKind::UoidMismatch {
                expected: uo.uo_id,
                got: resp.uo_id,
            }));
        }
        if resp.nonce != built.nonce {
            return Err(UoError::Corrupt(CorruptKind::NonceMismatch));
        }
        Ok(resp.protected_data)
    }

    /// AES-encrypt `data` inside the HSM.
    pub async fn encrypt(&self, uo: &UserObject, data: &[u8]) -> Result<Vec<u8>, UoError> {
        self.process_data(uo, RequestType::PlainAes, data).await
    }

    /// AES-decrypt `data` inside the HSM.
    pub async fn decrypt(&self, uo: &UserObject, data: &[u8]) -> Result<Vec<u8>, UoError> {
        self.process_data(uo, RequestType::PlainAesDecrypt, data).await
    }

    /// RSA-decrypt `data` inside the HSM; the modulus size follows the
    /// UO's capability bits.
    pub async fn rsa_decrypt(&self, uo: &UserObject, data: &[u8]) -> Result<Vec<u8>, UoError> {
        let req_type = match uo.uo_type & 0x000f_ffff {
            handle::kind::RSA1024DECRYPT => RequestType::Rsa1024,
            handle::kind::RSA2048DECRYPT => RequestType::Rsa2048,
            other => {
                return Err(UoError::Invalid(format!(
                    "UO type {other:#x} is not an RSA-decrypt object"
                )))
            }
        };
        self.process_data(uo, req_type, data).await
    }

    // ── Provisioning-side calls ────────────────────────────────────────────

    /// Fetch a provisioning template.
    pub async fn get_template(&self, request: &TemplateRequest) -> Result<TemplateRecord, UoError> {
        let body = serde_json::to_value(request)
            .map_err(|e| UoError::Invalid(format!("template request: {e}")))?;
        self.enroll_call(ApiFunction::GetUserObjectTemplate, body).await
    }

    /// List the RSA import keys, parsed and ready to use.
    pub async fn get_import_keys(&self) -> Result<Vec<ImportKey>, UoError> {
        let records: Vec<ImportKeyRecord> =
            self.enroll_call(ApiFunction::GetImportPublicKey, serde_json::Value::Null).await?;
        records.into_iter()
            .map(|r| {
                let key = PublicKey::from_tlv_hex(&r.key)
                    .map_err(|e| UoError::Corrupt(CorruptKind::ImportKey(e)))?;
                Ok(ImportKey { id: r.id, kind: r.kind, key })
            })
            .collect()
    }

    /// One provisioning-endpoint call, envelope checked, result decoded.
    pub(crate) async fn enroll_call<T: DeserializeOwned>(
        &self,
        function: ApiFunction,
        body: serde_json::Value,
    ) -> Result<T, UoError> {
        let call = request::ApiCall::enroll(&self.cfg, &CallOptions::default(), function, body)?;
        let env = self.connector.execute(&call).await?;
        decode_result(env)
    }
}

/// Check the envelope status and decode its `result`.
fn decode_result<T: DeserializeOwned>(env: ResponseEnvelope) -> Result<T, UoError> {
    let code = env.status_code().ok_or_else(|| {
        UoError::Corrupt(CorruptKind::Json(format!("status {:?} is not hex", env.status)))
    })?;
    if !status::is_ok(code) {
        return Err(UoError::ResponseFailed { status: code, detail: env.statusdetail });
    }
    let result = env.result
        .ok_or_else(|| UoError::Corrupt(CorruptKind::Json("envelope carries no result".into())))?;
    serde_json::from_value(result).map_err(|e| UoError::Corrupt(CorruptKind::Json(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_result_surfaces_the_status_word() {
        let env: ResponseEnvelope = serde_json::from_value(serde_json::json!({
            "status": "804c",
            "statusdetail": "(ERR)SW_INVALID_TLV_FORMAT",
        }))
        .unwrap();
        match decode_result::<serde_json::Value>(env) {
            Err(UoError::ResponseFailed { status, detail }) => {
                assert_eq!(status, 0x804c);
                assert_eq!(detail.as_deref(), Some("(ERR)SW_INVALID_TLV_FORMAT"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn user_object_debug_hides_keys() {
        let uo = UserObject::from_handle(
            "TEST_API000000ee01000000a001",
            [7u8; 32],
            [8u8; 32],
            Endpoint::new(Scheme::Https, "h", 443),
        )
        .unwrap();
        let dbg = format!("{uo:?}");
        assert!(!dbg.contains("enc_key"), "{dbg}");
        assert_eq!(uo.handle().to_string(), "TEST_API000000ee01000000a001");
    }
}
