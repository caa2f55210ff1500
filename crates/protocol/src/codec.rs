//! Frame encoding and decoding.
//!
//! Requests travel as `{"req": [id, method, params, timestamp], "sig": [...]}`
//! and replies as the same shape under `res`. The signature covers the compact
//! JSON of the `req` array, which [`Codec::payload`] returns.

use serde_json::{Value, json};
use thiserror::Error;

use crate::method::RpcMethod;
use crate::now_millis;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	/// Frame is JSON but carries neither `res` nor `req`.
	#[error("frame has no `res` or `req` envelope")]
	MissingEnvelope,

	#[error("malformed frame: {0}")]
	Malformed(String),
}

/// An outgoing request before framing.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
	/// Correlation id echoed by the coordinator in its reply.
	pub id: u64,
	pub method: RpcMethod,
	pub params: Value,
	/// Unix timestamp in milliseconds.
	pub timestamp: u64,
}

impl RequestEnvelope {
	/// Creates an envelope stamped with the current time.
	pub fn new(id: u64, method: impl Into<RpcMethod>, params: Value) -> Self {
		Self {
			id,
			method: method.into(),
			params,
			timestamp: now_millis(),
		}
	}

	fn body(&self) -> Value {
		json!([self.id, self.method.as_str(), self.params, self.timestamp])
	}
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
	pub method: RpcMethod,
	/// Request id this frame answers; `None` for uncorrelated pushes.
	pub correlation_id: Option<u64>,
	pub params: Value,
	/// Set when the frame is tagged `error`.
	pub error: Option<String>,
	pub timestamp: Option<u64>,
	pub signatures: Vec<String>,
}

impl InboundMessage {
	pub fn is_error(&self) -> bool {
		self.error.is_some()
	}
}

/// Turns requests into text frames and text frames into [`InboundMessage`]s.
pub trait Codec: Send + Sync {
	/// Bytes a signer should sign for `request`.
	fn payload(&self, request: &RequestEnvelope) -> Result<Vec<u8>, CodecError>;

	/// Frames `request` together with its signatures.
	fn encode(&self, request: &RequestEnvelope, signatures: &[String]) -> Result<String, CodecError>;

	fn decode(&self, frame: &str) -> Result<InboundMessage, CodecError>;
}

/// The NitroRPC framing spoken by ClearNode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NitroRpcCodec;

impl Codec for NitroRpcCodec {
	fn payload(&self, request: &RequestEnvelope) -> Result<Vec<u8>, CodecError> {
		Ok(serde_json::to_vec(&request.body())?)
	}

	fn encode(&self, request: &RequestEnvelope, signatures: &[String]) -> Result<String, CodecError> {
		Ok(serde_json::to_string(&json!({
			"req": request.body(),
			"sig": signatures,
		}))?)
	}

	fn decode(&self, frame: &str) -> Result<InboundMessage, CodecError> {
		let value: Value = serde_json::from_str(frame)?;
		let object = value
			.as_object()
			.ok_or_else(|| CodecError::Malformed("frame is not a JSON object".to_string()))?;

		let body = object.get("res").or_else(|| object.get("req")).ok_or(CodecError::MissingEnvelope)?;
		let slots = body
			.as_array()
			.ok_or_else(|| CodecError::Malformed("envelope is not an array".to_string()))?;
		if slots.len() < 3 {
			return Err(CodecError::Malformed(format!("envelope has {} slots, expected at least 3", slots.len())));
		}

		let correlation_id = match &slots[0] {
			Value::Null => None,
			id => {
				let id = id
					.as_u64()
					.ok_or_else(|| CodecError::Malformed(format!("request id is not an unsigned integer: {id}")))?;
				(id != 0).then_some(id)
			}
		};

		let method = slots[1]
			.as_str()
			.map(RpcMethod::from)
			.ok_or_else(|| CodecError::Malformed("method tag is not a string".to_string()))?;

		let params = unwrap_singleton(slots[2].clone());
		let error = (method == RpcMethod::Error).then(|| error_text(&params));

		let signatures = object
			.get("sig")
			.and_then(Value::as_array)
			.map(|sigs| sigs.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
			.unwrap_or_default();

		Ok(InboundMessage {
			method,
			correlation_id,
			params,
			error,
			timestamp: slots.get(3).and_then(Value::as_u64),
			signatures,
		})
	}
}

/// Older coordinators wrap params in a one-element array.
fn unwrap_singleton(params: Value) -> Value {
	match params {
		Value::Array(mut items) if items.len() == 1 && (items[0].is_object() || items[0].is_array()) => items.remove(0),
		other => other,
	}
}

fn error_text(params: &Value) -> String {
	match params {
		Value::String(s) => s.clone(),
		Value::Object(map) => match map.get("error") {
			Some(Value::String(s)) => s.clone(),
			Some(other) => other.to_string(),
			None => params.to_string(),
		},
		other => other.to_string(),
	}
}
