//! Client configuration.
//!
//! The library never mutates a [`Configuration`]; each call clones what it
//! needs and merges per-call overrides on top. Precedence: per-call
//! [`CallOptions`] > UO fields > `Configuration` > built-in defaults.

use std::fmt;
use std::time::Duration;

use uolink_proto::envelope::TemplateRequest;
use uolink_proto::nonce::NONCE_LEN;

use crate::errors::UoError;
use crate::retry::RetryPolicy;

/// URL scheme of a service endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scheme {
    /// Plain HTTP (development setups).
    Http,
    /// HTTPS.
    Https,
}

impl Scheme {
    /// The scheme token for URL assembly.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http  => "http",
            Self::Https => "https",
        }
    }
}

/// One service endpoint: scheme, host, port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    /// URL scheme.
    pub scheme: Scheme,
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint from parts.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self { scheme, host: host.into(), port }
    }

    /// Parse `https://host:port`; the port defaults per scheme when absent.
    pub fn parse(s: &str) -> Result<Self, UoError> {
        let url = url::Url::parse(s).map_err(|e| UoError::Invalid(format!("endpoint {s:?}: {e}")))?;
        let scheme = match url.scheme() {
            "http"  => Scheme::Http,
            "https" => Scheme::Https,
            other   => return Err(UoError::Invalid(format!("unsupported scheme {other:?}"))),
        };
        let host = url.host_str()
            .ok_or_else(|| UoError::Invalid(format!("endpoint {s:?} has no host")))?
            .to_string();
        let port = url.port().unwrap_or(match scheme {
            Scheme::Http  => 80,
            Scheme::Https => 443,
        });
        Ok(Self { scheme, host, port })
    }

    /// `scheme://host:port` with no trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// HTTP verb used for API calls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HttpMethod {
    /// Payload travels as an extra URL path segment.
    Get,
    /// Payload travels as a JSON body.
    #[default]
    Post,
}

/// Client-wide settings, cloned into every request.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Endpoint for `ProcessData` calls.
    pub endpoint_process: Endpoint,
    /// Endpoint for provisioning calls (templates, import keys, create).
    pub endpoint_enroll: Endpoint,
    /// Endpoint for user registration flows, when deployed separately.
    pub endpoint_register: Option<Endpoint>,
    /// The caller's API key.
    pub api_key: String,
    /// Default HTTP verb.
    pub http_method: HttpMethod,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retry policy for provisioning phases.
    pub retry: RetryPolicy,
    /// Defaults for `GetUserObjectTemplate` bodies.
    pub create_template: TemplateRequest,
}

impl Configuration {
    /// A configuration pointing every call at `endpoint`.
    pub fn new(api_key: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            endpoint_process: endpoint.clone(),
            endpoint_enroll: endpoint,
            endpoint_register: None,
            api_key: api_key.into(),
            http_method: HttpMethod::Post,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            create_template: TemplateRequest::client_keyed(0),
        }
    }
}

/// Per-call overrides; every field falls back to the configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallOptions {
    /// Override the HTTP verb.
    pub method: Option<HttpMethod>,
    /// Override the timeout.
    pub timeout: Option<Duration>,
    /// Pin the freshness nonce (tests; production draws from the CSPRNG).
    pub nonce: Option<[u8; NONCE_LEN]>,
}

impl CallOptions {
    /// Resolve the verb against `cfg`.
    pub fn method_or(&self, cfg: &Configuration) -> HttpMethod {
        self.method.unwrap_or(cfg.http_method)
    }

    /// Resolve the timeout against `cfg`.
    pub fn timeout_or(&self, cfg: &Configuration) -> Duration {
        self.timeout.unwrap_or(cfg.timeout)
    }
}
