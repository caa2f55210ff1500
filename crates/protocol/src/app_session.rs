//! Application session payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rules of a multi-participant application session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
	pub protocol: String,
	pub participants: Vec<String>,
	/// Voting weight per participant, same order as `participants`.
	pub weights: Vec<u64>,
	/// Total weight required to accept a state update.
	pub quorum: u64,
	/// Challenge period in seconds.
	pub challenge: u64,
	pub nonce: u64,
}

impl AppDefinition {
	/// Two-party definition where `owner` alone reaches quorum.
	pub fn two_party(owner: &str, counterparty: &str, nonce: u64) -> Self {
		Self {
			protocol: "nitroliterpc".to_string(),
			participants: vec![owner.to_string(), counterparty.to_string()],
			weights: vec![100, 0],
			quorum: 100,
			challenge: 0,
			nonce,
		}
	}
}

/// Initial or final share of an asset held by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
	pub participant: String,
	pub asset: String,
	pub amount: String,
}

impl Allocation {
	pub fn new(participant: &str, asset: &str, amount: &str) -> Self {
		Self {
			participant: participant.to_string(),
			asset: asset.to_string(),
			amount: amount.to_string(),
		}
	}
}

/// Parameters of `create_app_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAppSessionParams {
	pub definition: AppDefinition,
	pub allocations: Vec<Allocation>,
}

impl CreateAppSessionParams {
	/// Request params: the payload wrapped in a one-element array.
	pub fn to_params(&self) -> Result<Value, serde_json::Error> {
		Ok(Value::Array(vec![serde_json::to_value(self)?]))
	}
}

/// Parameters of `close_app_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAppSessionParams {
	pub app_session_id: String,
	pub allocations: Vec<Allocation>,
}

impl CloseAppSessionParams {
	pub fn to_params(&self) -> Result<Value, serde_json::Error> {
		Ok(Value::Array(vec![serde_json::to_value(self)?]))
	}
}

/// Coordinator's view of an application session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSessionInfo {
	pub app_session_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<u64>,
	/// Fields this client does not model.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
