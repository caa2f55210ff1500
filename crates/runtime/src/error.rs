//! Error types for the ClearNode runtime.

use std::time::Duration;

use clearnode_protocol::CodecError;
use thiserror::Error;

use crate::signer::SignerError;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a ClearNode session.
#[derive(Debug, Error)]
pub enum Error {
	/// Opening, writing to, or reading from the transport failed. Fatal to the connection.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The coordinator rejected the credentials presented during the handshake.
	#[error("Authentication rejected: {0}")]
	Auth(String),

	/// Malformed or unexpected frame during the handshake.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// No correlated reply arrived before the deadline.
	#[error("Timeout after {}ms waiting for {method}", timeout.as_millis())]
	Timeout { method: String, timeout: Duration },

	#[error("Not authenticated: call authenticate() before sending requests")]
	NotAuthenticated,

	#[error("Invalid state: {0}")]
	InvalidState(String),

	/// The call was outstanding when the session was closed.
	#[error("Cancelled: session closed")]
	Cancelled,

	/// The coordinator answered a request with an error frame.
	#[error("{method} failed: {message}")]
	Remote { method: String, message: String },

	#[error("Signer error: {0}")]
	Signer(#[from] SignerError),

	#[error("Codec error: {0}")]
	Codec(#[from] CodecError),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the call was cancelled by `close()`.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}

	/// Returns the server-reported reason if authentication was rejected.
	pub fn auth_reason(&self) -> Option<&str> {
		match self {
			Error::Auth(reason) => Some(reason),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timeout_message_includes_method_and_millis() {
		let err = Error::Timeout {
			method: "get_ledger_balances".to_string(),
			timeout: Duration::from_millis(1500),
		};
		assert!(err.is_timeout());
		assert_eq!(err.to_string(), "Timeout after 1500ms waiting for get_ledger_balances");
	}

	#[test]
	fn auth_reason_only_for_auth_errors() {
		assert_eq!(Error::Auth("bad-sig".to_string()).auth_reason(), Some("bad-sig"));
		assert_eq!(Error::Cancelled.auth_reason(), None);
		assert!(Error::Cancelled.is_cancelled());
	}
}
