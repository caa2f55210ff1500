//! Authentication handshake payloads.
//!
//! The handshake is three frames:
//!
//! 1. client sends `auth_request` with [`AuthRequestParams`]
//! 2. coordinator answers `auth_challenge` carrying a challenge string
//! 3. client sends `auth_verify` with the challenge, signed over the policy
//!    built by [`policy_typed_data`]; the coordinator answers `auth_verify`
//!    with an [`AuthVerifyResult`]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::typed::{TypedData, TypedDomain, TypedField};

/// Spending allowance requested for the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
	pub asset: String,
	pub amount: String,
}

/// Parameters of the `auth_request` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequestParams {
	/// Wallet address being authenticated.
	pub address: String,
	/// Key that will sign requests for this session.
	pub session_key: String,
	pub app_name: String,
	pub allowances: Vec<Allowance>,
	/// Unix timestamp (seconds) after which the session is no longer valid.
	pub expire: u64,
	pub scope: String,
	/// Application contract address.
	pub application: String,
}

impl AuthRequestParams {
	pub fn to_params(&self) -> Value {
		serde_json::to_value(self).unwrap_or(Value::Null)
	}
}

/// Parameters of the outgoing `auth_verify` frame.
pub fn verify_params(challenge: &str) -> Value {
	json!({ "challenge": challenge })
}

/// Extracts the challenge string from an `auth_challenge` payload.
pub fn challenge_of(params: &Value) -> Option<&str> {
	["challenge_message", "challenge", "nonce"]
		.iter()
		.find_map(|key| params.get(key).and_then(Value::as_str))
}

/// Builds the typed policy the wallet signs to answer `challenge`.
pub fn policy_typed_data(challenge: &str, request: &AuthRequestParams) -> TypedData {
	let mut types = BTreeMap::new();
	types.insert(
		"Policy".to_string(),
		vec![
			TypedField::new("challenge", "string"),
			TypedField::new("scope", "string"),
			TypedField::new("wallet", "address"),
			TypedField::new("session_key", "address"),
			TypedField::new("expire", "uint64"),
			TypedField::new("allowances", "Allowance[]"),
		],
	);
	types.insert(
		"Allowance".to_string(),
		vec![TypedField::new("asset", "string"), TypedField::new("amount", "string")],
	);

	TypedData {
		domain: TypedDomain::named(request.app_name.clone()),
		primary_type: "Policy".to_string(),
		types,
		message: json!({
			"challenge": challenge,
			"scope": request.scope,
			"wallet": request.address,
			"session_key": request.session_key,
			"expire": request.expire,
			"allowances": request.allowances,
		}),
	}
}

/// Payload of the coordinator's `auth_verify` answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthVerifyResult {
	#[serde(default)]
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, alias = "jwtToken", skip_serializing_if = "Option::is_none")]
	pub jwt_token: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(default, alias = "sessionKey", skip_serializing_if = "Option::is_none")]
	pub session_key: Option<String>,
}

impl AuthVerifyResult {
	/// Lenient parse; anything unreadable counts as a failed verification.
	pub fn from_params(params: &Value) -> Self {
		serde_json::from_value(params.clone()).unwrap_or_default()
	}

	/// Server-reported reason for a failed verification.
	pub fn failure_reason(&self) -> String {
		self.reason
			.clone()
			.or_else(|| self.error.clone())
			.unwrap_or_else(|| "authentication rejected".to_string())
	}
}
