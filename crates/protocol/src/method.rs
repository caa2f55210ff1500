//! RPC method tags.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Method tag carried in the second slot of every request and response.
///
/// Tags the client does not know about are kept verbatim in [`RpcMethod::Other`]
/// so they can still be correlated and forwarded to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RpcMethod {
	AuthRequest,
	AuthChallenge,
	AuthVerify,
	Error,
	GetConfig,
	GetLedgerBalances,
	CreateAppSession,
	CloseAppSession,
	Ping,
	Pong,
	/// Server push: balance update.
	BalanceUpdate,
	/// Server push: supported assets.
	Assets,
	/// Server push: channel list.
	Channels,
	Other(String),
}

impl RpcMethod {
	pub fn as_str(&self) -> &str {
		match self {
			RpcMethod::AuthRequest => "auth_request",
			RpcMethod::AuthChallenge => "auth_challenge",
			RpcMethod::AuthVerify => "auth_verify",
			RpcMethod::Error => "error",
			RpcMethod::GetConfig => "get_config",
			RpcMethod::GetLedgerBalances => "get_ledger_balances",
			RpcMethod::CreateAppSession => "create_app_session",
			RpcMethod::CloseAppSession => "close_app_session",
			RpcMethod::Ping => "ping",
			RpcMethod::Pong => "pong",
			RpcMethod::BalanceUpdate => "bu",
			RpcMethod::Assets => "assets",
			RpcMethod::Channels => "channels",
			RpcMethod::Other(tag) => tag,
		}
	}

	/// Returns `true` for the tags that belong to the authentication handshake.
	pub fn is_handshake(&self) -> bool {
		matches!(self, RpcMethod::AuthChallenge | RpcMethod::AuthVerify | RpcMethod::Error)
	}

	/// Returns `true` if a reply to `self` may carry the tag `reply`.
	///
	/// Most replies echo the request tag; `ping` is answered with `pong`.
	pub fn answered_by(&self, reply: &RpcMethod) -> bool {
		self == reply || matches!((self, reply), (RpcMethod::Ping, RpcMethod::Pong))
	}
}

impl From<&str> for RpcMethod {
	fn from(tag: &str) -> Self {
		match tag {
			"auth_request" => RpcMethod::AuthRequest,
			"auth_challenge" => RpcMethod::AuthChallenge,
			"auth_verify" => RpcMethod::AuthVerify,
			"error" => RpcMethod::Error,
			"get_config" => RpcMethod::GetConfig,
			"get_ledger_balances" => RpcMethod::GetLedgerBalances,
			"create_app_session" => RpcMethod::CreateAppSession,
			"close_app_session" => RpcMethod::CloseAppSession,
			"ping" => RpcMethod::Ping,
			"pong" => RpcMethod::Pong,
			"bu" => RpcMethod::BalanceUpdate,
			"assets" => RpcMethod::Assets,
			"channels" => RpcMethod::Channels,
			other => RpcMethod::Other(other.to_string()),
		}
	}
}

impl From<String> for RpcMethod {
	fn from(tag: String) -> Self {
		match RpcMethod::from(tag.as_str()) {
			RpcMethod::Other(_) => RpcMethod::Other(tag),
			known => known,
		}
	}
}

impl fmt::Display for RpcMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl Serialize for RpcMethod {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for RpcMethod {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let tag = String::deserialize(deserializer)?;
		Ok(RpcMethod::from(tag))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_tags_map_to_variants() {
		assert_eq!(RpcMethod::from("auth_challenge"), RpcMethod::AuthChallenge);
		assert_eq!(RpcMethod::from("get_ledger_balances"), RpcMethod::GetLedgerBalances);
		assert_eq!(RpcMethod::from("bu"), RpcMethod::BalanceUpdate);
		assert_eq!(RpcMethod::CreateAppSession.as_str(), "create_app_session");
	}

	#[test]
	fn unknown_tags_are_preserved() {
		let method = RpcMethod::from("resize_channel".to_string());
		assert_eq!(method, RpcMethod::Other("resize_channel".to_string()));
		assert_eq!(method.to_string(), "resize_channel");
	}

	#[test]
	fn ping_is_answered_by_pong() {
		assert!(RpcMethod::Ping.answered_by(&RpcMethod::Pong));
		assert!(RpcMethod::GetConfig.answered_by(&RpcMethod::GetConfig));
		assert!(!RpcMethod::GetConfig.answered_by(&RpcMethod::Pong));
	}

	#[test]
	fn serde_uses_wire_tag() {
		let json = serde_json::to_string(&RpcMethod::AuthVerify).unwrap();
		assert_eq!(json, r#""auth_verify""#);
		let back: RpcMethod = serde_json::from_str(&json).unwrap();
		assert_eq!(back, RpcMethod::AuthVerify);
	}
}
