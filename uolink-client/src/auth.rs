//! User authentication (HOTP / password) over `ProcessData`.
//!
//! Every call is a two-stage pipeline: the transport stage yields the UO's
//! decrypted payload, a TLV decode stage yields the domain reply. The HSM
//! returns a fresh encrypted context on *every* reply, including failed
//! verifications (their failure counters have already moved), so the
//! session persists it unconditionally once the reply parses.

use uolink_proto::auth_tlv::{self, AuthContext, AuthMethod, AuthOp};
use uolink_proto::process_data::RequestType;
use uolink_proto::status;

use crate::errors::UoError;
use crate::{UoClient, UserObject};

use uolink_crypto::sha256;

/// Where an auth session currently stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthState {
    /// No call in flight.
    Idle,
    /// Request built and sent.
    RequestSent,
    /// Transport reply received, TLV not yet decoded.
    ResponseReceived,
    /// Last verification succeeded.
    AuthOk,
    /// Last verification was rejected by the HSM.
    AuthFailed,
    /// The last reply failed to decode; the stored context is unchanged.
    Corrupt,
}

/// A user's auth session: their id, their current encrypted context, and
/// the state of the last call.
#[derive(Clone, Debug)]
pub struct AuthSession {
    user_id: [u8; 8],
    ctx: Vec<u8>,
    state: AuthState,
}

impl AuthSession {
    /// Resume a session from a persisted context blob.
    pub fn new(user_id: [u8; 8], ctx: Vec<u8>) -> Self {
        Self { user_id, ctx, state: AuthState::Idle }
    }

    /// The user id.
    pub fn user_id(&self) -> [u8; 8] { self.user_id }

    /// The context blob to persist between calls.
    pub fn context(&self) -> &[u8] { &self.ctx }

    /// State of the last call.
    pub fn state(&self) -> AuthState { self.state }
}

/// The verdict of one auth call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthOutcome {
    /// HSM status word.
    pub status: u16,
    /// True when the status is OK.
    pub ok: bool,
}

/// SHA-256 of a password, the form the password method stores and checks.
pub fn password_hash(password: &str) -> [u8; 32] {
    sha256!(password.as_bytes())
}

impl UoClient {
    /// Enroll a fresh auth context and open a session for it.
    pub async fn enroll_auth_context(
        &self,
        uo: &UserObject,
        ctx: &AuthContext,
    ) -> Result<AuthSession, UoError> {
        let payload = auth_tlv::build_new_context(ctx)?;
        let data = self.process_data(uo, RequestType::Auth, &payload).await?;
        let reply = auth_tlv::parse_auth_response(&data, auth_tlv::TAG_NEW_CTX)?;
        if !status::is_ok(reply.status) {
            return Err(UoError::ResponseFailed { status: reply.status, detail: None });
        }
        tracing::debug!(user_id = ?ctx.user_id, "auth context enrolled");
        Ok(AuthSession { user_id: ctx.user_id, ctx: reply.new_ctx, state: AuthState::Idle })
    }

    /// Verify an HOTP code for `session`'s user.
    ///
    /// A rejected code returns `Ok` with a non-OK status, and the session
    /// still absorbs the fresh context, which the caller must persist.
    pub async fn auth_hotp(
        &self,
        uo: &UserObject,
        session: &mut AuthSession,
        code: u32,
    ) -> Result<AuthOutcome, UoError> {
        self.auth_call(uo, session, AuthOp::Hotp, &code.to_be_bytes()).await
    }

    /// Verify a password for `session`'s user.
    pub async fn auth_password(
        &self,
        uo: &UserObject,
        session: &mut AuthSession,
        password: &str,
    ) -> Result<AuthOutcome, UoError> {
        let hash = password_hash(password);
        self.auth_call(uo, session, AuthOp::Password, &hash).await
    }

    /// Replace one method record in the user's context (e.g. a password
    /// change after HOTP verification).
    pub async fn update_auth_method(
        &self,
        uo: &UserObject,
        session: &mut AuthSession,
        method: &AuthMethod,
    ) -> Result<AuthOutcome, UoError> {
        let payload = auth_tlv::build_update(&session.user_id, &session.ctx, method)?;
        self.auth_exchange(uo, session, payload, auth_tlv::TAG_UPDATE_CTX).await
    }

    async fn auth_call(
        &self,
        uo: &UserObject,
        session: &mut AuthSession,
        op: AuthOp,
        code: &[u8],
    ) -> Result<AuthOutcome, UoError> {
        let payload = auth_tlv::build_auth(&session.user_id, code, &session.ctx, op);
        self.auth_exchange(uo, session, payload, op.tag()).await
    }

    /// Stage 1 (transport) then stage 2 (TLV decode), tracking the session
    /// state across both.
    async fn auth_exchange(
        &self,
        uo: &UserObject,
        session: &mut AuthSession,
        payload: Vec<u8>,
        reply_tag: u8,
    ) -> Result<AuthOutcome, UoError> {
        session.state = AuthState::RequestSent;
        let data = match self.process_data(uo, RequestType::Auth, &payload).await {
            Ok(data) => data,
            Err(e) => {
                session.state = AuthState::Idle;
                return Err(e);
            }
        };
        session.state = AuthState::ResponseReceived;

        let reply = match auth_tlv::parse_auth_response(&data, reply_tag) {
            Ok(reply) => reply,
            Err(e) => {
                session.state = AuthState::Corrupt;
                return Err(e.into());
            }
        };

        session.ctx = reply.new_ctx;
        let ok = status::is_ok(reply.status);
        session.state = if ok { AuthState::AuthOk } else { AuthState::AuthFailed };
        if !ok {
            tracing::info!(status = reply.status, "authentication rejected by the HSM");
        }
        Ok(AuthOutcome { status: reply.status, ok })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_sha256() {
        let h = password_hash("hunter2");
        assert_eq!(h.len(), 32);
        assert_ne!(h, password_hash("hunter3"));
        assert_eq!(h, password_hash("hunter2"), "deterministic");
    }

    #[test]
    fn session_accessors() {
        let s = AuthSession::new(*b"usr00001", vec![1, 2, 3]);
        assert_eq!(s.user_id(), *b"usr00001");
        assert_eq!(s.context(), &[1, 2, 3]);
        assert_eq!(s.state(), AuthState::Idle);
    }
}
