//! Local wallet key signer.

mod eip712;

use std::fmt;

use async_trait::async_trait;
use clearnode_runtime::protocol::TypedData;
use clearnode_runtime::{Signer, SignerError};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

pub use eip712::{keccak256, typed_data_hash};

/// Signs with an in-memory secp256k1 key.
///
/// Request payloads get an EIP-191 `personal_sign` over their keccak256
/// digest; the authentication policy gets an EIP-712 signature. Signatures
/// are `0x`-prefixed hex `r ‖ s ‖ v` with `v` in `{27, 28}`.
pub struct KeySigner {
	key: SigningKey,
	address: String,
}

impl KeySigner {
	/// Parses a hex secret, with or without a `0x` prefix.
	pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
		let secret = secret.trim();
		let secret = secret.strip_prefix("0x").unwrap_or(secret);
		let bytes = hex::decode(secret).map_err(|e| SignerError::new(format!("private key is not valid hex: {e}")))?;
		let bytes: [u8; 32] = bytes
			.as_slice()
			.try_into()
			.map_err(|_| SignerError::new(format!("private key must be 32 bytes, got {}", bytes.len())))?;
		Self::from_bytes(&bytes)
	}

	pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, SignerError> {
		let key = SigningKey::from_slice(secret).map_err(|_| SignerError::new("private key is not a valid secp256k1 scalar"))?;
		let address = address_of(key.verifying_key());
		Ok(Self { key, address })
	}

	fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, SignerError> {
		let (signature, recovery) = self
			.key
			.sign_prehash_recoverable(digest)
			.map_err(|e| SignerError::new(format!("signing failed: {e}")))?;
		let mut bytes = [0u8; 65];
		bytes[..64].copy_from_slice(&signature.to_bytes());
		bytes[64] = 27 + recovery.to_byte();
		Ok(format!("0x{}", hex::encode(bytes)))
	}
}

impl fmt::Debug for KeySigner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeySigner").field("address", &self.address).finish_non_exhaustive()
	}
}

#[async_trait]
impl Signer for KeySigner {
	fn address(&self) -> &str {
		&self.address
	}

	async fn sign_raw(&self, payload: &[u8]) -> Result<String, SignerError> {
		self.sign_digest(&personal_message_hash(&keccak256(payload)))
	}

	async fn sign_typed(&self, data: &TypedData) -> Result<String, SignerError> {
		self.sign_digest(&typed_data_hash(data)?)
	}
}

/// Checksummed (EIP-55) address of `key`.
pub fn address_of(key: &VerifyingKey) -> String {
	let point = k256::PublicKey::from(key).to_encoded_point(false);
	let hash = keccak256(&point.as_bytes()[1..]);
	checksum(&hash[12..])
}

fn checksum(address: &[u8]) -> String {
	let lower = hex::encode(address);
	let hash = keccak256(lower.as_bytes());
	let mut out = String::with_capacity(2 + lower.len());
	out.push_str("0x");
	for (i, c) in lower.chars().enumerate() {
		let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
		out.push(if nibble >= 8 { c.to_ascii_uppercase() } else { c });
	}
	out
}

/// EIP-191 digest of `message`: `keccak256("\x19Ethereum Signed Message:\n" ‖ len ‖ message)`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
	let mut buf = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
	buf.extend_from_slice(message);
	keccak256(&buf)
}
