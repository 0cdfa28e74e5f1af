//! HTTP connector: one call in, one parsed envelope out.

use std::time::Instant;

use uolink_proto::envelope::ResponseEnvelope;

use crate::config::HttpMethod;
use crate::errors::{CorruptKind, UoError};
use crate::request::ApiCall;

/// Thin wrapper over a shared `reqwest` client.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct Connector {
    http: reqwest::Client,
}

impl Connector {
    /// A connector with a fresh connection pool.
    pub fn new() -> Result<Self, UoError> {
        Ok(Self { http: reqwest::Client::builder().build()? })
    }

    /// Send `call` and decode the response envelope.
    ///
    /// Transport failures and non-2xx statuses map to
    /// [`UoError::Connection`]; a body that is not the expected JSON maps
    /// to [`UoError::Corrupt`]. The envelope's own status word is *not*
    /// checked here; stage-2 decoders do that per call type.
    pub async fn execute(&self, call: &ApiCall) -> Result<ResponseEnvelope, UoError> {
        let url = call.url()?;
        let started = Instant::now();

        let request = match call.method {
            // The body is sent without a Content-Type header; the service
            // accepts the bare JSON bytes.
            HttpMethod::Post => {
                let body = serde_json::to_vec(&call.body)
                    .map_err(|e| UoError::Invalid(format!("request body: {e}")))?;
                self.http.post(url).body(body)
            }
            HttpMethod::Get => self.http.get(url),
        };

        let outcome = async {
            let response = request.timeout(call.timeout).send().await?;
            let response = response.error_for_status()?;
            response.text().await.map_err(UoError::from)
        }
        .await;

        let elapsed = started.elapsed();
        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    function = %call.function,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "service call failed: {e}"
                );
                return Err(e);
            }
        };
        tracing::debug!(
            function = %call.function,
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = text.len(),
            "service call finished"
        );

        serde_json::from_str(&text).map_err(|e| UoError::Corrupt(CorruptKind::Json(e.to_string())))
    }
}
