//! Wire codec for the UO protocol.
//!
//! This crate handles:
//! * The `ProcessData` envelope — framing, AES-256-CBC, CBC-MAC, nonces
//! * UO handles and the response-nonce transform
//! * The HOTP/password auth TLV sub-protocol
//! * Template filling for UO provisioning
//! * The JSON envelope and status words
//!
//! It is transport-agnostic: `uolink-client` supplies HTTP on top.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth_tlv;
pub mod cursor;
pub mod envelope;
pub mod handle;
pub mod nonce;
pub mod process_data;
pub mod status;
pub mod template;

pub use auth_tlv::{AuthContext, AuthMethod, AuthOp, AuthResponse, TlvError};
pub use envelope::{ResponseEnvelope, TemplateRecord, TemplateRequest};
pub use handle::{HandleError, UoHandle};
pub use process_data::{BuildError, BuiltRequest, ParseError, ProcessDataRequest, ProcessDataResponse, RequestType};
pub use template::{FillError, FilledTemplate, TemplateKeys};
