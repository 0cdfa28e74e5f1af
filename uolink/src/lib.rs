//! # uolink — UO service client library
//!
//! `uolink` talks to a remote HSM service that hosts "User Objects" (UOs):
//! opaque key-holding objects invoked through an authenticated, encrypted
//! envelope. It consists of three focused sub-crates wired together here
//! for convenience:
//!
//! | Sub-crate       | Role                                                  |
//! |-----------------|-------------------------------------------------------|
//! | `uolink-crypto` | AES-CBC/CBC-MAC, padding, RSA key wrap, HOTP, bits    |
//! | `uolink-proto`  | ProcessData envelope, handles, auth TLV, templates    |
//! | `uolink-client` | Async HTTP client, provisioning, retry, auth sessions |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use uolink::client::{Configuration, Endpoint, UoClient, UserObject};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::parse("https://hsm.example.com:11180")?;
//! let cfg = Configuration::new("MY_API_KEY", endpoint.clone());
//! let client = UoClient::new(cfg)?;
//!
//! // Invoke a stored UO with previously negotiated keys.
//! let uo = UserObject::from_handle("MY_API_KEY000000ee01000000a001",
//!     [0u8; 32], [0u8; 32], endpoint)?;
//! let ciphertext = client.encrypt(&uo, b"secret").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`uolink_crypto`] — CBC envelope, padding, RSA wrap, HOTP.
pub use uolink_crypto as crypto;

/// Re-export of [`uolink_proto`] — wire codec, handles, auth TLV, templates.
pub use uolink_proto as proto;

/// Re-export of [`uolink_client`] — the async client.
pub use uolink_client as client;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use uolink_client::{Configuration, Endpoint, ProvisionError, UoClient, UoError, UserObject};
pub use uolink_proto::{RequestType, UoHandle};
