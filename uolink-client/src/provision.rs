//! UO provisioning: the two-call GetTemplate → CreateUserObject sequence.
//!
//! Each phase runs under its own retry budget. Cancellation aborts the
//! pending retry sleep; an in-flight HTTP request is not killed, its
//! response is discarded.

use tokio_util::sync::CancellationToken;

use uolink_crypto::random_key;
use uolink_proto::envelope::{CreateRequest, CreateResult, TemplateRecord, TemplateRequest};
use uolink_proto::handle::{self, UoHandle};
use uolink_proto::template::{self, TemplateKeys};

use crate::errors::{Phase, ProvisionError, UoError};
use crate::retry::RetryHandler;
use crate::{ApiFunction, UoClient, UserObject};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// The client-chosen keys for a new UO.
#[derive(Clone)]
pub struct ProvisionKeys {
    /// Communication encryption key.
    pub comm_enc: [u8; 32],
    /// Communication MAC key.
    pub comm_mac: [u8; 32],
    /// Next communication encryption key (for the rotation handshake).
    pub comm_next_enc: [u8; 32],
    /// Next communication MAC key.
    pub comm_next_mac: [u8; 32],
    /// Application key, when the caller supplies it.
    pub app_key: Option<Vec<u8>>,
    /// Billing key, when the caller supplies it.
    pub billing_key: Option<Vec<u8>>,
}

impl ProvisionKeys {
    /// Four fresh comm keys from the CSPRNG, no app or billing key.
    pub fn generate() -> Self {
        Self {
            comm_enc: random_key(),
            comm_mac: random_key(),
            comm_next_enc: random_key(),
            comm_next_mac: random_key(),
            app_key: None,
            billing_key: None,
        }
    }

    /// Map onto the template's slot names.
    fn template_keys(&self) -> TemplateKeys {
        let mut keys = TemplateKeys::new()
            .with("comenc", self.comm_enc.to_vec())
            .with("commac", self.comm_mac.to_vec())
            .with("comnextenc", self.comm_next_enc.to_vec())
            .with("comnextmac", self.comm_next_mac.to_vec());
        if let Some(app) = &self.app_key {
            keys.insert("app", app.clone());
        }
        if let Some(billing) = &self.billing_key {
            keys.insert("billing", billing.clone());
        }
        keys
    }
}

impl std::fmt::Debug for ProvisionKeys {
    // keys stay out of logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionKeys")
            .field("app_key", &self.app_key.is_some())
            .field("billing_key", &self.billing_key.is_some())
            .finish_non_exhaustive()
    }
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// What to provision.
#[derive(Clone, Debug)]
pub struct CreateUo {
    /// Capability word of the new UO (the client-key flag bits are set
    /// automatically from the supplied keys).
    pub uo_type: u32,
    /// Keys to splice into the template.
    pub keys: ProvisionKeys,
    /// Template request override; `None` uses the configuration default.
    pub template: Option<TemplateRequest>,
}

impl CreateUo {
    /// Provision a UO of `uo_type` with freshly generated comm keys.
    pub fn new(uo_type: u32) -> Self {
        Self { uo_type, keys: ProvisionKeys::generate(), template: None }
    }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

impl UoClient {
    /// Provision a new UO.
    pub async fn create_uo(&self, request: &CreateUo) -> Result<UserObject, ProvisionError> {
        self.create_uo_cancellable(request, CancellationToken::new()).await
    }

    /// [`UoClient::create_uo`] with an external cancellation token.
    /// Cancelling aborts the next scheduled attempt without sending a
    /// spurious request.
    pub async fn create_uo_cancellable(
        &self,
        request: &CreateUo,
        cancel: CancellationToken,
    ) -> Result<UserObject, ProvisionError> {
        let mut tpl_request = request.template.clone()
            .unwrap_or_else(|| self.config().create_template.clone());
        let mut uo_type = request.uo_type | handle::TYPE_COMM_KEYS_CLIENT;
        tpl_request.generation.commkey = 1;
        if request.keys.app_key.is_some() {
            uo_type |= handle::TYPE_APP_KEY_CLIENT;
            tpl_request.generation.appkey = 1;
        }
        tpl_request.uo_type = format!("{uo_type:08x}");

        // Phase 1: fetch the template.
        let mut handler = RetryHandler::with_token(self.config().retry.clone(), cancel.clone());
        let template: TemplateRecord = self
            .run_phase(Phase::Template, &mut handler, &cancel, || self.get_template(&tpl_request))
            .await?;

        // Filling is local and deterministic; failures surface immediately.
        let filled = template::fill(&template, &request.keys.template_keys())
            .map_err(|e| ProvisionError { phase: Phase::Import, source: e.into() })?;
        let create_request = CreateRequest {
            objectid: template.objectid.clone(),
            importkey: filled.import_key_id,
            object: hex::encode(&filled.blob),
            authorization: template.authorization.clone(),
        };

        // Phase 2: upload the filled template.
        handler.reset();
        let created = self
            .run_phase(Phase::Import, &mut handler, &cancel, || self.create_object(&create_request))
            .await?;

        let parsed: UoHandle = created.handle.parse()
            .map_err(|e| ProvisionError { phase: Phase::Import, source: UoError::from(e) })?;
        tracing::info!(uo_id = parsed.uo_id, uo_type = parsed.uo_type, "user object created");

        Ok(UserObject {
            uo_id: parsed.uo_id,
            uo_type: parsed.uo_type,
            enc_key: request.keys.comm_enc,
            mac_key: request.keys.comm_mac,
            api_key: parsed.api_key,
            endpoint: self.config().endpoint_process.clone(),
        })
    }

    /// Upload a filled template. Exposed for callers that drive the two
    /// phases themselves.
    pub async fn create_object(&self, request: &CreateRequest) -> Result<CreateResult, UoError> {
        let body = serde_json::to_value(request)
            .map_err(|e| UoError::Invalid(format!("create request: {e}")))?;
        self.enroll_call(ApiFunction::CreateUserObject, body).await
    }

    /// Run one provisioning phase under the retry handler.
    async fn run_phase<T, F, Fut>(
        &self,
        phase: Phase,
        handler: &mut RetryHandler,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ProvisionError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, UoError>>,
    {
        loop {
            let outcome = op().await;
            // A response that lands after cancellation is discarded.
            if cancel.is_cancelled() {
                return Err(ProvisionError { phase, source: UoError::Cancelled });
            }
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && !handler.limit_reached() => {
                    tracing::info!(
                        phase = phase.code(),
                        attempt = handler.attempts(),
                        "provisioning call failed, retrying: {e}"
                    );
                    if let Err(cancelled) = handler.wait().await {
                        return Err(ProvisionError { phase, source: cancelled });
                    }
                }
                Err(e) => return Err(ProvisionError { phase, source: e }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_distinct() {
        let keys = ProvisionKeys::generate();
        assert_ne!(keys.comm_enc, keys.comm_mac);
        assert_ne!(keys.comm_enc, keys.comm_next_enc);
        assert!(keys.app_key.is_none());
    }

    #[test]
    fn template_keys_cover_the_comm_slots() {
        let mut keys = ProvisionKeys::generate();
        keys.app_key = Some(vec![0x22; 16]);
        let tk = keys.template_keys();
        assert_eq!(tk.get("comenc"), Some(&keys.comm_enc[..]));
        assert_eq!(tk.get("commac"), Some(&keys.comm_mac[..]));
        assert_eq!(tk.get("comnextenc"), Some(&keys.comm_next_enc[..]));
        assert_eq!(tk.get("comnextmac"), Some(&keys.comm_next_mac[..]));
        assert_eq!(tk.get("app"), Some(&[0x22u8; 16][..]));
        assert_eq!(tk.get("billing"), None);
        assert!(tk.has_app_key());
    }

    #[test]
    fn debug_never_prints_key_material() {
        let keys = ProvisionKeys::generate();
        let dbg = format!("{keys:?}");
        assert!(!dbg.contains("comm_enc"), "{dbg}");
    }
}
