//! Structured data handed to a signer's typed-signing capability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain a typed message is scoped to.
///
/// Only the fields that are set take part in the domain separator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDomain {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain_id: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub verifying_contract: Option<String>,
}

impl TypedDomain {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}
}

/// One member of a struct type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: String,
}

impl TypedField {
	pub fn new(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
		}
	}
}

/// A typed, domain-scoped message.
///
/// `types` lists every struct reachable from `primary_type` so a signer can
/// hash the message without out-of-band schema knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
	pub domain: TypedDomain,
	pub primary_type: String,
	pub types: BTreeMap<String, Vec<TypedField>>,
	pub message: Value,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn domain_omits_unset_fields() {
		let named = serde_json::to_value(TypedDomain::named("demo-app.local")).unwrap();
		assert_eq!(named, json!({ "name": "demo-app.local" }));

		let full = TypedDomain {
			chain_id: Some(1),
			verifying_contract: Some("0xcc".to_string()),
			..TypedDomain::named("Ether Mail")
		};
		let value = serde_json::to_value(&full).unwrap();
		assert_eq!(value["chainId"], 1);
		assert_eq!(value["verifyingContract"], "0xcc");
		assert!(value.get("version").is_none());
	}
}
