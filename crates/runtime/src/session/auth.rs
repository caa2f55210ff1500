//! Challenge-response authentication.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use clearnode_protocol::auth::{challenge_of, policy_typed_data, verify_params};
use clearnode_protocol::{Allowance, AuthRequestParams, AuthVerifyResult, InboundMessage, RequestEnvelope, RpcMethod};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ConnectionState, Handshake, SessionOrchestrator, Shared};
use crate::error::{Error, Result};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Progress through the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
	Idle,
	RequestSent,
	ChallengeReceived,
	Verified,
	/// The last attempt failed; `authenticate()` may be retried while the connection is open.
	Failed,
}

impl AuthPhase {
	pub fn in_flight(self) -> bool {
		matches!(self, AuthPhase::RequestSent | AuthPhase::ChallengeReceived)
	}
}

/// Who is authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
	pub address: String,
	/// Key that will sign requests; defaults to `address`.
	pub session_key: String,
	pub app_name: String,
}

impl Identity {
	pub fn new(address: impl Into<String>, app_name: impl Into<String>) -> Self {
		let address = address.into();
		Self {
			session_key: address.clone(),
			address,
			app_name: app_name.into(),
		}
	}

	pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
		self.session_key = session_key.into();
		self
	}
}

/// What the session is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
	pub scope: String,
	/// Application contract address.
	pub application: String,
	pub allowances: Vec<Allowance>,
}

impl Default for Capabilities {
	fn default() -> Self {
		Self {
			scope: "console".to_string(),
			application: ZERO_ADDRESS.to_string(),
			allowances: Vec::new(),
		}
	}
}

impl Capabilities {
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();
		self
	}

	pub fn with_application(mut self, application: impl Into<String>) -> Self {
		self.application = application.into();
		self
	}

	pub fn with_allowance(mut self, asset: impl Into<String>, amount: impl Into<String>) -> Self {
		self.allowances.push(Allowance {
			asset: asset.into(),
			amount: amount.into(),
		});
		self
	}
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
	pub address: String,
	pub session_key: String,
	/// Token the coordinator issued for reconnects, if any.
	pub jwt_token: Option<String>,
	/// Unix timestamp (seconds) the session was requested to expire at.
	pub expires_at: u64,
}

impl SessionOrchestrator {
	/// Runs the challenge-response handshake.
	///
	/// # Errors
	///
	/// - [`Error::InvalidState`] if the connection is not open or a handshake is in flight
	/// - [`Error::Auth`] if the coordinator rejects the signed challenge
	/// - [`Error::Protocol`] on an error frame or an unexpected frame
	/// - [`Error::Timeout`] if the handshake exceeds the handshake timeout
	/// - [`Error::Cancelled`] / [`Error::Transport`] if the connection ends mid-handshake
	pub async fn authenticate(&self, identity: &Identity, capabilities: &Capabilities) -> Result<AuthSession> {
		let token = self.next_handshake.fetch_add(1, Ordering::SeqCst);
		let (tx, mut rx) = mpsc::unbounded_channel();
		{
			let mut state = self.shared.state.lock();
			if state.connection != ConnectionState::Open {
				return Err(Error::InvalidState(format!(
					"authenticate requires an open connection (connection is {:?})",
					state.connection
				)));
			}
			if state.auth.in_flight() {
				return Err(Error::InvalidState("an authentication handshake is already in flight".to_string()));
			}
			state.auth = AuthPhase::RequestSent;
			state.handshake = Some(Handshake {
				token,
				awaiting: None,
				tx,
			});
		}
		let mut guard = HandshakeGuard::new(token, Arc::downgrade(&self.shared));

		let timeout = self.config.handshake_timeout;
		let outcome = match tokio::time::timeout(timeout, self.handshake(token, identity, capabilities, &mut rx)).await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::Timeout {
				method: "authentication handshake".to_string(),
				timeout,
			}),
		};

		{
			let mut state = self.shared.state.lock();
			if state.handshake.as_ref().is_some_and(|h| h.token == token) {
				state.handshake = None;
				state.auth = if outcome.is_ok() { AuthPhase::Verified } else { AuthPhase::Failed };
			}
		}
		guard.complete();

		match &outcome {
			Ok(session) => info!(address = %session.address, jwt = session.jwt_token.is_some(), "authenticated"),
			Err(e) => warn!(error = %e, "authentication failed"),
		}
		outcome
	}

	async fn handshake(
		&self,
		token: u64,
		identity: &Identity,
		capabilities: &Capabilities,
		frames: &mut mpsc::UnboundedReceiver<Result<InboundMessage>>,
	) -> Result<AuthSession> {
		let request = AuthRequestParams {
			address: identity.address.clone(),
			session_key: identity.session_key.clone(),
			app_name: identity.app_name.clone(),
			allowances: capabilities.allowances.clone(),
			expire: clearnode_protocol::now_millis() / 1000 + self.config.auth_expiry.as_secs(),
			scope: capabilities.scope.clone(),
			application: capabilities.application.clone(),
		};

		let envelope = RequestEnvelope::new(self.next_request_id(), RpcMethod::AuthRequest, request.to_params());
		self.await_reply(token, envelope.id);
		self.send_frame(self.codec.encode(&envelope, &[])?)?;
		debug!(id = envelope.id, address = %request.address, scope = %request.scope, "auth_request sent");

		let reply = next_frame(frames, envelope.id).await?;
		let challenge = match reply.method {
			RpcMethod::AuthChallenge => challenge_of(&reply.params)
				.map(str::to_string)
				.ok_or_else(|| Error::Protocol("auth_challenge carries no challenge".to_string()))?,
			RpcMethod::Error => {
				return Err(Error::Protocol(format!(
					"auth_request rejected: {}",
					reply.error.unwrap_or_default()
				)));
			}
			other => return Err(Error::Protocol(format!("expected auth_challenge, received {other}"))),
		};
		self.advance_handshake(token, AuthPhase::ChallengeReceived);

		let policy = policy_typed_data(&challenge, &request);
		let signature = self.signer.sign_typed(&policy).await?;
		let verify = RequestEnvelope::new(self.next_request_id(), RpcMethod::AuthVerify, verify_params(&challenge));
		self.await_reply(token, verify.id);
		self.send_frame(self.codec.encode(&verify, &[signature])?)?;
		debug!(id = verify.id, "auth_verify sent");

		let verdict = next_frame(frames, verify.id).await?;
		match verdict.method {
			RpcMethod::AuthVerify => {}
			RpcMethod::Error => {
				return Err(Error::Protocol(format!(
					"auth_verify rejected: {}",
					verdict.error.unwrap_or_default()
				)));
			}
			other => return Err(Error::Protocol(format!("expected auth_verify, received {other}"))),
		}

		let result = AuthVerifyResult::from_params(&verdict.params);
		if !result.success {
			return Err(Error::Auth(result.failure_reason()));
		}

		Ok(AuthSession {
			address: result.address.unwrap_or_else(|| identity.address.clone()),
			session_key: result.session_key.unwrap_or_else(|| identity.session_key.clone()),
			jwt_token: result.jwt_token,
			expires_at: request.expire,
		})
	}

	fn advance_handshake(&self, token: u64, phase: AuthPhase) {
		let mut state = self.shared.state.lock();
		if state.handshake.as_ref().is_some_and(|h| h.token == token) {
			state.auth = phase;
		}
	}

	/// Only replies to `id` (or uncorrelated frames) reach the handshake from now on.
	fn await_reply(&self, token: u64, id: u64) {
		let mut state = self.shared.state.lock();
		if let Some(handshake) = state.handshake.as_mut().filter(|h| h.token == token) {
			handshake.awaiting = Some(id);
		}
	}
}

async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Result<InboundMessage>>, expected: u64) -> Result<InboundMessage> {
	loop {
		let message = frames.recv().await.unwrap_or(Err(Error::Cancelled))?;
		match message.correlation_id {
			Some(id) if id != expected => debug!(id, expected, method = %message.method, "skipping stale handshake frame"),
			_ => return Ok(message),
		}
	}
}

/// Marks the handshake `token` failed if its `authenticate()` future is
/// dropped before finishing.
struct HandshakeGuard {
	token: u64,
	shared: Weak<Shared>,
	completed: bool,
}

impl HandshakeGuard {
	fn new(token: u64, shared: Weak<Shared>) -> Self {
		Self {
			token,
			shared,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for HandshakeGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		let Some(shared) = self.shared.upgrade() else {
			return;
		};
		let mut state = shared.state.lock();
		if state.handshake.as_ref().is_some_and(|h| h.token == self.token) {
			state.handshake = None;
			state.auth = AuthPhase::Failed;
			debug!(token = self.token, "abandoned authentication handshake");
		}
	}
}
