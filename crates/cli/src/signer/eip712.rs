//! EIP-712 hashing of [`TypedData`].
//!
//! The domain type is derived from whichever [`TypedDomain`] fields are set,
//! the way wallets build `EIP712Domain` when it is not declared explicitly.

use std::collections::{BTreeMap, BTreeSet};

use clearnode_runtime::SignerError;
use clearnode_runtime::protocol::{TypedData, TypedDomain, TypedField};
use serde_json::Value;
use sha3::{Digest, Keccak256};

type Types = BTreeMap<String, Vec<TypedField>>;
type Word = [u8; 32];

pub fn keccak256(bytes: &[u8]) -> Word {
	let mut out = [0u8; 32];
	out.copy_from_slice(&Keccak256::digest(bytes));
	out
}

/// Digest a wallet signs for `data`: `keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(message))`.
pub fn typed_data_hash(data: &TypedData) -> Result<Word, SignerError> {
	let mut buf = Vec::with_capacity(66);
	buf.extend_from_slice(&[0x19, 0x01]);
	buf.extend_from_slice(&domain_separator(&data.domain)?);
	buf.extend_from_slice(&hash_struct(&data.primary_type, &data.message, &data.types)?);
	Ok(keccak256(&buf))
}

pub fn domain_separator(domain: &TypedDomain) -> Result<Word, SignerError> {
	let mut fields = vec![TypedField::new("name", "string")];
	if domain.version.is_some() {
		fields.push(TypedField::new("version", "string"));
	}
	if domain.chain_id.is_some() {
		fields.push(TypedField::new("chainId", "uint256"));
	}
	if domain.verifying_contract.is_some() {
		fields.push(TypedField::new("verifyingContract", "address"));
	}
	let types = Types::from([("EIP712Domain".to_string(), fields)]);
	let value = serde_json::to_value(domain).map_err(|e| SignerError::new(format!("typed domain: {e}")))?;
	hash_struct("EIP712Domain", &value, &types)
}

pub fn hash_struct(name: &str, value: &Value, types: &Types) -> Result<Word, SignerError> {
	let fields = struct_fields(name, types)?;
	let mut buf = Vec::with_capacity(32 * (fields.len() + 1));
	buf.extend_from_slice(&keccak256(encode_type(name, types)?.as_bytes()));
	for field in fields {
		let member = value
			.get(&field.name)
			.ok_or_else(|| SignerError::new(format!("{name} is missing field {}", field.name)))?;
		buf.extend_from_slice(&encode_value(&field.kind, member, types)?);
	}
	Ok(keccak256(&buf))
}

/// `Primary(type name,...)` followed by every referenced struct in name order.
pub fn encode_type(primary: &str, types: &Types) -> Result<String, SignerError> {
	let mut referenced = BTreeSet::new();
	collect_dependencies(primary, types, &mut referenced);
	referenced.remove(primary);

	let mut out = String::new();
	for name in std::iter::once(primary).chain(referenced.iter().map(String::as_str)) {
		let members: Vec<String> = struct_fields(name, types)?
			.iter()
			.map(|field| format!("{} {}", field.kind, field.name))
			.collect();
		out.push_str(name);
		out.push('(');
		out.push_str(&members.join(","));
		out.push(')');
	}
	Ok(out)
}

fn struct_fields<'a>(name: &str, types: &'a Types) -> Result<&'a [TypedField], SignerError> {
	types
		.get(name)
		.map(Vec::as_slice)
		.ok_or_else(|| SignerError::new(format!("unknown struct type {name}")))
}

fn collect_dependencies(name: &str, types: &Types, found: &mut BTreeSet<String>) {
	if found.contains(name) {
		return;
	}
	let Some(fields) = types.get(name) else {
		return;
	};
	found.insert(name.to_string());
	for field in fields {
		let base = field.kind.split('[').next().unwrap_or(&field.kind);
		collect_dependencies(base, types, found);
	}
}

/// `T[]` or `T[n]` to `T`.
fn array_element(kind: &str) -> Option<&str> {
	let open = kind.strip_suffix(']')?.rfind('[')?;
	Some(&kind[..open])
}

fn encode_value(kind: &str, value: &Value, types: &Types) -> Result<Word, SignerError> {
	if let Some(element) = array_element(kind) {
		let items = value.as_array().ok_or_else(|| mismatch(kind, value))?;
		let mut buf = Vec::with_capacity(32 * items.len());
		for item in items {
			buf.extend_from_slice(&encode_value(element, item, types)?);
		}
		return Ok(keccak256(&buf));
	}
	if types.contains_key(kind) {
		return hash_struct(kind, value, types);
	}

	match kind {
		"string" => value.as_str().map(|s| keccak256(s.as_bytes())).ok_or_else(|| mismatch(kind, value)),
		"bytes" => Ok(keccak256(&hex_value(kind, value)?)),
		"bool" => {
			let flag = value.as_bool().ok_or_else(|| mismatch(kind, value))?;
			let mut word = [0u8; 32];
			word[31] = u8::from(flag);
			Ok(word)
		}
		"address" => {
			let bytes = hex_value(kind, value)?;
			if bytes.len() != 20 {
				return Err(mismatch(kind, value));
			}
			let mut word = [0u8; 32];
			word[12..].copy_from_slice(&bytes);
			Ok(word)
		}
		_ if kind.starts_with("uint") => integer(kind, value, false),
		_ if kind.starts_with("int") => integer(kind, value, true),
		_ => match kind.strip_prefix("bytes").and_then(|n| n.parse::<usize>().ok()) {
			Some(size @ 1..=32) => {
				let bytes = hex_value(kind, value)?;
				if bytes.len() > size {
					return Err(mismatch(kind, value));
				}
				let mut word = [0u8; 32];
				word[..bytes.len()].copy_from_slice(&bytes);
				Ok(word)
			}
			_ => Err(SignerError::new(format!("unsupported typed field type {kind}"))),
		},
	}
}

/// Big-endian 256-bit word from a JSON number or a decimal / `0x` string.
/// Negative values are two's complement and only allowed for `intN`.
fn integer(kind: &str, value: &Value, signed: bool) -> Result<Word, SignerError> {
	let (negative, magnitude) = match value {
		Value::Number(n) => match (n.as_u64(), n.as_i64()) {
			(Some(u), _) => (false, u64_word(u)),
			(None, Some(i)) => (true, u64_word(i.unsigned_abs())),
			_ => return Err(mismatch(kind, value)),
		},
		Value::String(s) => {
			let s = s.trim();
			let (negative, digits) = match s.strip_prefix('-') {
				Some(rest) => (true, rest),
				None => (false, s),
			};
			let word = match digits.strip_prefix("0x") {
				Some(hex) => hex_word(hex),
				None => decimal_word(digits),
			};
			(negative, word.ok_or_else(|| mismatch(kind, value))?)
		}
		_ => return Err(mismatch(kind, value)),
	};

	if !negative {
		return Ok(magnitude);
	}
	if !signed {
		return Err(mismatch(kind, value));
	}
	let mut word = magnitude.map(|b| !b);
	for byte in word.iter_mut().rev() {
		let (sum, overflow) = byte.overflowing_add(1);
		*byte = sum;
		if !overflow {
			break;
		}
	}
	Ok(word)
}

fn u64_word(value: u64) -> Word {
	let mut word = [0u8; 32];
	word[24..].copy_from_slice(&value.to_be_bytes());
	word
}

fn decimal_word(digits: &str) -> Option<Word> {
	if digits.is_empty() {
		return None;
	}
	let mut word = [0u8; 32];
	for c in digits.chars() {
		let mut carry = c.to_digit(10)?;
		for byte in word.iter_mut().rev() {
			let v = u32::from(*byte) * 10 + carry;
			*byte = (v & 0xff) as u8;
			carry = v >> 8;
		}
		if carry != 0 {
			return None;
		}
	}
	Some(word)
}

fn hex_word(digits: &str) -> Option<Word> {
	let padded = if digits.len() % 2 == 1 { format!("0{digits}") } else { digits.to_string() };
	let bytes = hex::decode(padded).ok()?;
	if bytes.is_empty() || bytes.len() > 32 {
		return None;
	}
	let mut word = [0u8; 32];
	word[32 - bytes.len()..].copy_from_slice(&bytes);
	Some(word)
}

fn hex_value(kind: &str, value: &Value) -> Result<Vec<u8>, SignerError> {
	let text = value.as_str().ok_or_else(|| mismatch(kind, value))?;
	hex::decode(text.strip_prefix("0x").unwrap_or(text)).map_err(|_| mismatch(kind, value))
}

fn mismatch(kind: &str, value: &Value) -> SignerError {
	SignerError::new(format!("typed value {value} is not a valid {kind}"))
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn mail() -> TypedData {
		let types = Types::from([
			(
				"Person".to_string(),
				vec![TypedField::new("name", "string"), TypedField::new("wallet", "address")],
			),
			(
				"Mail".to_string(),
				vec![
					TypedField::new("from", "Person"),
					TypedField::new("to", "Person"),
					TypedField::new("contents", "string"),
				],
			),
		]);
		TypedData {
			domain: TypedDomain {
				version: Some("1".to_string()),
				chain_id: Some(1),
				verifying_contract: Some("0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC".to_string()),
				..TypedDomain::named("Ether Mail")
			},
			primary_type: "Mail".to_string(),
			types,
			message: json!({
				"from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
				"to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
				"contents": "Hello, Bob!",
			}),
		}
	}

	#[test]
	fn keccak_of_empty_input() {
		assert_eq!(
			hex::encode(keccak256(b"")),
			"c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
		);
	}

	#[test]
	fn encodes_type_with_sorted_dependencies() {
		let data = mail();
		assert_eq!(
			encode_type("Mail", &data.types).unwrap(),
			"Mail(Person from,Person to,string contents)Person(string name,address wallet)"
		);
	}

	#[test]
	fn hashes_mail_example() {
		let data = mail();
		assert_eq!(
			hex::encode(hash_struct("Mail", &data.message, &data.types).unwrap()),
			"c52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
		);
		assert_eq!(
			hex::encode(domain_separator(&data.domain).unwrap()),
			"f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
		);
		assert_eq!(
			hex::encode(typed_data_hash(&data).unwrap()),
			"be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
		);
	}

	#[test]
	fn hashes_struct_arrays_element_wise() {
		let types = Types::from([
			("Allowance".to_string(), vec![TypedField::new("asset", "string")]),
			("Policy".to_string(), vec![TypedField::new("allowances", "Allowance[]")]),
		]);
		let value = json!({ "allowances": [{ "asset": "usdc" }, { "asset": "eth" }] });

		let usdc = hash_struct("Allowance", &json!({ "asset": "usdc" }), &types).unwrap();
		let eth = hash_struct("Allowance", &json!({ "asset": "eth" }), &types).unwrap();
		let mut expected = keccak256(b"Policy(Allowance[] allowances)Allowance(string asset)").to_vec();
		expected.extend_from_slice(&keccak256(&[usdc, eth].concat()));

		assert_eq!(hash_struct("Policy", &value, &types).unwrap(), keccak256(&expected));
	}

	#[test]
	fn encodes_integers() {
		let types = Types::new();
		let mut max_u64 = [0u8; 32];
		max_u64[24..].fill(0xff);
		assert_eq!(encode_value("uint64", &json!(u64::MAX), &types).unwrap(), max_u64);
		assert_eq!(encode_value("uint256", &json!("18446744073709551615"), &types).unwrap(), max_u64);
		assert_eq!(encode_value("uint256", &json!("0xffffffffffffffff"), &types).unwrap(), max_u64);
		assert_eq!(encode_value("int256", &json!(-1), &types).unwrap(), [0xff; 32]);
		assert_eq!(encode_value("int8", &json!("-2"), &types).unwrap()[31], 0xfe);

		assert!(encode_value("uint256", &json!(-1), &types).is_err());
		assert!(encode_value("uint256", &json!("12a"), &types).is_err());
		assert!(encode_value("uint256", &json!("1".repeat(80)), &types).is_err());
	}

	#[test]
	fn rejects_malformed_values() {
		let types = Types::new();
		assert!(encode_value("address", &json!("0x1234"), &types).is_err());
		assert!(encode_value("string", &json!(5), &types).is_err());
		assert!(encode_value("bytes4", &json!("0x0102030405"), &types).is_err());
		assert!(encode_value("fixed128x18", &json!("1"), &types).is_err());
		assert!(hash_struct("Missing", &json!({}), &types).is_err());

		let data = mail();
		assert!(hash_struct("Person", &json!({ "name": "Cow" }), &data.types).is_err());
	}
}
