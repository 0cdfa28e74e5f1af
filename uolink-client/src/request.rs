//! Assembling API calls: URL layout, common header fields, and the merge
//! of configuration into each request.

use std::fmt;
use std::time::Duration;

use uolink_proto::nonce::{self, NONCE_LEN};

use crate::config::{CallOptions, Configuration, Endpoint, HttpMethod};
use crate::errors::UoError;

/// Protocol version segment of every URL.
pub const API_VERSION: &str = "1.0";

/// The service functions this client issues.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApiFunction {
    /// Invoke a UO.
    ProcessData,
    /// Fetch a provisioning template.
    GetUserObjectTemplate,
    /// Upload a filled template.
    CreateUserObject,
    /// List the RSA import keys.
    GetImportPublicKey,
}

impl ApiFunction {
    /// The function token as it appears in the URL path.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcessData           => "ProcessData",
            Self::GetUserObjectTemplate => "GetUserObjectTemplate",
            Self::CreateUserObject      => "CreateUserObject",
            Self::GetImportPublicKey    => "GetImportPublicKey",
        }
    }
}

impl fmt::Display for ApiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fully resolved API call, ready for the connector.
#[derive(Clone, Debug)]
pub struct ApiCall {
    /// Where the call goes.
    pub endpoint: Endpoint,
    /// Resolved HTTP verb.
    pub method: HttpMethod,
    /// Resolved timeout.
    pub timeout: Duration,
    /// Handle (or bare API key) segment of the path.
    pub handle: String,
    /// Function segment of the path.
    pub function: ApiFunction,
    /// Nonce segment of the path.
    pub nonce: [u8; NONCE_LEN],
    /// JSON body (also the GET payload for non-ProcessData calls).
    pub body: serde_json::Value,
}

impl ApiCall {
    /// A `ProcessData` call: body `{"data": wire}`, URL nonce = frame nonce.
    pub fn process_data(
        cfg: &Configuration,
        opts: &CallOptions,
        handle: String,
        wire: &str,
        frame_nonce: [u8; NONCE_LEN],
    ) -> Self {
        Self {
            endpoint: cfg.endpoint_process.clone(),
            method: opts.method_or(cfg),
            timeout: opts.timeout_or(cfg),
            handle,
            function: ApiFunction::ProcessData,
            nonce: frame_nonce,
            body: serde_json::json!({ "data": wire }),
        }
    }

    /// A provisioning call: the request object travels verbatim, with the
    /// common header fields (`function`, `nonce`, `version`) merged in.
    pub fn enroll(
        cfg: &Configuration,
        opts: &CallOptions,
        function: ApiFunction,
        body: serde_json::Value,
    ) -> Result<Self, UoError> {
        let nonce = opts.nonce.unwrap_or_else(nonce::generate);
        let mut body = match body {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null        => serde_json::Map::new(),
            other => {
                return Err(UoError::Invalid(format!("request body must be an object, got {other}")))
            }
        };
        body.insert("function".into(), function.as_str().into());
        body.insert("nonce".into(), hex::encode(nonce).into());
        body.insert("version".into(), API_VERSION.into());

        Ok(Self {
            endpoint: cfg.endpoint_enroll.clone(),
            method: opts.method_or(cfg),
            timeout: opts.timeout_or(cfg),
            handle: cfg.api_key.clone(),
            function,
            nonce,
            body: serde_json::Value::Object(body),
        })
    }

    /// The URL nonce segment.
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }

    /// `{base}/{version}/{handle}/{function}/{nonce}`, plus the payload
    /// segment for GET calls.
    pub fn url(&self) -> Result<url::Url, UoError> {
        let mut url = url::Url::parse(&self.endpoint.base_url())
            .map_err(|e| UoError::Invalid(format!("endpoint: {e}")))?;
        {
            let mut segments = url.path_segments_mut()
                .map_err(|()| UoError::Invalid("endpoint cannot carry a path".into()))?;
            segments.push(API_VERSION);
            segments.push(&self.handle);
            segments.push(self.function.as_str());
            segments.push(&self.nonce_hex());
            if self.method == HttpMethod::Get {
                segments.push(&self.get_payload());
            }
        }
        Ok(url)
    }

    /// The extra path segment a GET call carries instead of a body.
    fn get_payload(&self) -> String {
        if self.function == ApiFunction::ProcessData {
            if let Some(wire) = self.body.get("data").and_then(|v| v.as_str()) {
                return wire.to_string();
            }
        }
        self.body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;

    fn cfg() -> Configuration {
        Configuration::new("TEST_API", Endpoint::new(Scheme::Https, "hsm.example.com", 11180))
    }

    #[test]
    fn post_url_layout() {
        let call = ApiCall::process_data(
            &cfg(),
            &CallOptions::default(),
            "TEST_API000000ee010000a001".into(),
            "Packet0_PLAINAES_0000",
            [0xaa; 8],
        );
        assert_eq!(
            call.url().unwrap().as_str(),
            "https://hsm.example.com:11180/1.0/TEST_API000000ee010000a001/ProcessData/aaaaaaaaaaaaaaaa"
        );
        assert_eq!(call.body["data"], "Packet0_PLAINAES_0000");
    }

    #[test]
    fn get_url_appends_the_payload_segment() {
        let opts = CallOptions { method: Some(HttpMethod::Get), ..Default::default() };
        let call = ApiCall::process_data(&cfg(), &opts, "h00aabbccdd".into(), "Packet0_X_00", [0; 8]);
        let url = call.url().unwrap();
        assert!(url.as_str().ends_with("/Packet0_X_00"), "{url}");
    }

    #[test]
    fn enroll_merges_the_header_fields() {
        let call = ApiCall::enroll(
            &cfg(),
            &CallOptions { nonce: Some([0x11; 8]), ..Default::default() },
            ApiFunction::GetUserObjectTemplate,
            serde_json::json!({ "format": 1 }),
        )
        .unwrap();
        assert_eq!(call.handle, "TEST_API");
        assert_eq!(call.body["format"], 1);
        assert_eq!(call.body["function"], "GetUserObjectTemplate");
        assert_eq!(call.body["nonce"], "1111111111111111");
        assert_eq!(call.body["version"], API_VERSION);
    }

    #[test]
    fn non_object_enroll_bodies_are_invalid() {
        let err = ApiCall::enroll(
            &cfg(),
            &CallOptions::default(),
            ApiFunction::GetImportPublicKey,
            serde_json::json!([1, 2]),
        )
        .unwrap_err();
        assert!(matches!(err, UoError::Invalid(_)));
    }
}
