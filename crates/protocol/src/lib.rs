//! ClearNode protocol - wire types and message codec.
//!
//! This crate knows how ClearNode frames look on the wire and nothing about
//! how they are transported or correlated:
//!
//! - [`RpcMethod`] - method tags carried by every frame
//! - [`Codec`] / [`NitroRpcCodec`] - request encoding and response decoding
//! - [`auth`] - handshake payloads and the typed policy signed during auth
//! - [`ledger`] and [`app_session`] - payloads of the typed operations
//!
//! The session lifecycle (connect, authenticate, correlate, close) lives in
//! `clearnode-runtime`.

pub mod app_session;
pub mod auth;
pub mod codec;
pub mod ledger;
pub mod method;
pub mod typed;

pub use app_session::{AppDefinition, AppSessionInfo, Allocation, CloseAppSessionParams, CreateAppSessionParams};
pub use auth::{Allowance, AuthRequestParams, AuthVerifyResult};
pub use codec::{Codec, CodecError, InboundMessage, NitroRpcCodec, RequestEnvelope};
pub use ledger::LedgerBalance;
pub use method::RpcMethod;
pub use typed::{TypedData, TypedDomain, TypedField};

/// Milliseconds since the Unix epoch, as stamped on outgoing requests.
pub fn now_millis() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or_default()
}
