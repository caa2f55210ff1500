//! Session timeouts and limits.

use std::time::Duration;

/// Tunables consumed by [`SessionOrchestrator`](crate::SessionOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
	/// Deadline for the transport to report ready.
	pub connect_timeout: Duration,
	/// Default deadline for a correlated reply.
	pub request_timeout: Duration,
	/// Deadline for the whole challenge-response handshake.
	pub handshake_timeout: Duration,
	/// How far in the future the requested session expires.
	pub auth_expiry: Duration,
	/// Buffer size of the notification channel.
	pub notification_capacity: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			connect_timeout: Duration::from_secs(10),
			request_timeout: Duration::from_secs(30),
			handshake_timeout: Duration::from_secs(15),
			auth_expiry: Duration::from_secs(3600),
			notification_capacity: 64,
		}
	}
}

impl SessionConfig {
	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = timeout;
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;
		self
	}

	pub fn with_auth_expiry(mut self, expiry: Duration) -> Self {
		self.auth_expiry = expiry;
		self
	}

	pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
		self.notification_capacity = capacity.max(1);
		self
	}
}

/// Per-call overrides for [`SessionOrchestrator::request_with`](crate::SessionOrchestrator::request_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
	/// Sign the request payload with the session signer.
	pub sign: bool,
	/// Overrides [`SessionConfig::request_timeout`].
	pub timeout: Option<Duration>,
}

impl Default for CallOptions {
	fn default() -> Self {
		Self { sign: true, timeout: None }
	}
}

impl CallOptions {
	pub fn unsigned() -> Self {
		Self {
			sign: false,
			..Self::default()
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}
