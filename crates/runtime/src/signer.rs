//! Signing seam.
//!
//! Key management and the signature scheme belong to the caller. The session
//! only needs two capabilities: signing request payloads and signing the typed
//! policy that answers the authentication challenge.

use async_trait::async_trait;
use clearnode_protocol::TypedData;
use thiserror::Error;

/// Failure reported by a [`Signer`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SignerError(pub String);

impl SignerError {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// Produces signatures on behalf of the authenticated wallet.
#[async_trait]
pub trait Signer: Send + Sync {
	/// Address the signatures can be attributed to.
	fn address(&self) -> &str;

	/// Signs an arbitrary payload, returning the encoded signature.
	async fn sign_raw(&self, payload: &[u8]) -> Result<String, SignerError>;

	/// Signs a typed, domain-scoped message.
	async fn sign_typed(&self, data: &TypedData) -> Result<String, SignerError>;
}
