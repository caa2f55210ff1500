//! Scripted coordinator for integration tests.
//!
//! Wraps the [`MemoryPeer`] side of an in-memory connection with helpers to
//! read the client's requests and answer them with NitroRPC frames.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use clearnode_runtime::protocol::TypedData;
use clearnode_runtime::{
	Capabilities, Identity, MemoryConnector, MemoryPeer, SessionConfig, SessionOrchestrator, Signer, SignerError,
};
use serde_json::{Value, json};

pub const URL: &str = "ws://clearnode.test/ws";
pub const WALLET: &str = "0x00000000000000000000000000000000000000aa";

/// Signer producing deterministic, inspectable signatures.
pub struct TestSigner {
	address: String,
}

impl TestSigner {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			address: WALLET.to_string(),
		})
	}
}

#[async_trait]
impl Signer for TestSigner {
	fn address(&self) -> &str {
		&self.address
	}

	async fn sign_raw(&self, payload: &[u8]) -> Result<String, SignerError> {
		Ok(format!("raw:{}", payload.len()))
	}

	async fn sign_typed(&self, data: &TypedData) -> Result<String, SignerError> {
		Ok(format!("typed:{}", data.primary_type))
	}
}

/// A request as the coordinator sees it.
#[derive(Debug)]
pub struct Request {
	pub id: u64,
	pub method: String,
	pub params: Value,
	pub signatures: Vec<String>,
}

pub fn parse_request(frame: &str) -> Request {
	let value: Value = serde_json::from_str(frame).expect("client sent invalid JSON");
	let req = value["req"].as_array().expect("client frame has no req array");
	Request {
		id: req[0].as_u64().expect("request id"),
		method: req[1].as_str().expect("method tag").to_string(),
		params: req[2].clone(),
		signatures: value["sig"]
			.as_array()
			.map(|sigs| sigs.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
			.unwrap_or_default(),
	}
}

/// Builds a `res` frame.
pub fn response(id: u64, method: &str, params: Value) -> String {
	json!({ "res": [id, method, params, 1_700_000_000_000u64] }).to_string()
}

pub struct Coordinator {
	pub peer: MemoryPeer,
}

impl Coordinator {
	/// Next request from the client; panics if the client hung up.
	pub async fn next_request(&mut self) -> Request {
		let frame = self.peer.recv().await.expect("client closed the connection");
		parse_request(&frame)
	}

	pub fn reply(&self, id: u64, method: &str, params: Value) {
		assert!(self.peer.send(response(id, method, params)), "client is gone");
	}

	pub fn push(&self, frame: impl Into<String>) {
		assert!(self.peer.send(frame), "client is gone");
	}

	/// Plays the coordinator side of a handshake ending in `verdict`.
	pub async fn run_handshake(&mut self, verdict: Value) {
		let request = self.next_request().await;
		assert_eq!(request.method, "auth_request");
		self.reply(request.id, "auth_challenge", json!({ "challenge_message": "abc" }));

		let verify = self.next_request().await;
		assert_eq!(verify.method, "auth_verify");
		assert_eq!(verify.params["challenge"], "abc");
		assert_eq!(verify.signatures, vec!["typed:Policy".to_string()]);
		self.reply(verify.id, "auth_verify", verdict);
	}
}

pub fn identity() -> Identity {
	Identity::new(WALLET, "clearnode-tests")
}

/// Orchestrator connected to a fresh in-memory coordinator.
pub async fn connected(config: SessionConfig) -> (SessionOrchestrator, Coordinator) {
	let (connector, mut accepted) = MemoryConnector::new();
	let session = SessionOrchestrator::new(Arc::new(connector), TestSigner::new(), config);
	session.connect(URL).await.expect("Failed to connect");
	let peer = accepted.recv().await.expect("connector produced no peer");
	(session, Coordinator { peer })
}

/// Orchestrator that completed a successful handshake.
pub async fn authenticated(config: SessionConfig) -> (SessionOrchestrator, Coordinator) {
	let (session, mut coordinator) = connected(config).await;
	let identity = identity();
	let capabilities = Capabilities::default();
	let (auth, ()) = tokio::join!(
		session.authenticate(&identity, &capabilities),
		coordinator.run_handshake(json!({ "success": true }))
	);
	auth.expect("Failed to authenticate");
	(session, coordinator)
}
