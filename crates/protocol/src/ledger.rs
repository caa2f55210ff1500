//! Off-chain ledger balances.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Balance of one asset on the coordinator's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
	pub asset: String,
	/// Decimal amount as reported by the coordinator.
	pub amount: String,
}

/// Parameters of `get_ledger_balances`, a one-element array like every
/// ledger and app session request.
pub fn balances_params(participant: &str) -> Value {
	json!([{ "participant": participant }])
}

/// Reads balances out of a `get_ledger_balances` reply.
///
/// Coordinators answer with `{"ledger_balances": [...]}`, a bare array of
/// balances, or a map of asset to amount; all three are accepted.
pub fn parse_balances(params: &Value) -> Result<Vec<LedgerBalance>, serde_json::Error> {
	match params {
		Value::Object(map) => match map.get("ledger_balances") {
			Some(list) => serde_json::from_value(list.clone()),
			None => Ok(map
				.iter()
				.map(|(asset, amount)| LedgerBalance {
					asset: asset.clone(),
					amount: amount.as_str().map(str::to_string).unwrap_or_else(|| amount.to_string()),
				})
				.collect()),
		},
		other => serde_json::from_value(other.clone()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_wrapped_list() {
		let balances = parse_balances(&json!({"ledger_balances": [{"asset": "usdc", "amount": "100"}]})).unwrap();
		assert_eq!(
			balances,
			vec![LedgerBalance {
				asset: "usdc".to_string(),
				amount: "100".to_string()
			}]
		);
	}

	#[test]
	fn parses_bare_list_and_map() {
		let list = parse_balances(&json!([{"asset": "eth", "amount": "0.5"}])).unwrap();
		assert_eq!(list[0].asset, "eth");

		let map = parse_balances(&json!({"usdc": "100", "eth": 2})).unwrap();
		assert_eq!(map.len(), 2);
		assert!(map.iter().any(|b| b.asset == "eth" && b.amount == "2"));
		assert!(map.iter().any(|b| b.asset == "usdc" && b.amount == "100"));
	}

	#[test]
	fn balances_params_are_wrapped() {
		assert_eq!(balances_params("0xme"), json!([{"participant": "0xme"}]));
	}

	#[test]
	fn rejects_scalar() {
		assert!(parse_balances(&json!("100")).is_err());
	}
}
