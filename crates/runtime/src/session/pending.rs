//! Outstanding calls awaiting a correlated reply.

use std::collections::HashMap;
use std::sync::Weak;

use clearnode_protocol::{InboundMessage, RpcMethod};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::Shared;
use crate::error::Result;

pub(crate) struct PendingCall {
	pub method: RpcMethod,
	pub created: Instant,
	pub tx: oneshot::Sender<Result<Value>>,
}

/// Pending calls keyed by request id.
#[derive(Default)]
pub(crate) struct PendingCalls {
	calls: HashMap<u64, PendingCall>,
}

impl PendingCalls {
	/// Registers a call. Returns `false` if `id` is already outstanding.
	pub fn insert(&mut self, id: u64, call: PendingCall) -> bool {
		if self.calls.contains_key(&id) {
			return false;
		}
		self.calls.insert(id, call);
		true
	}

	pub fn remove(&mut self, id: u64) -> Option<PendingCall> {
		self.calls.remove(&id)
	}

	/// Removes and returns the call `message` answers.
	///
	/// A frame with a request id only ever matches that id. A frame without
	/// one matches the oldest call whose method it answers; uncorrelated error
	/// frames match nothing.
	pub fn take_match(&mut self, message: &InboundMessage) -> Option<(u64, PendingCall)> {
		if let Some(id) = message.correlation_id {
			return self.calls.remove(&id).map(|call| (id, call));
		}
		if message.is_error() {
			return None;
		}

		let id = self
			.calls
			.iter()
			.filter(|(_, call)| call.method.answered_by(&message.method))
			.min_by_key(|(id, call)| (call.created, **id))
			.map(|(id, _)| *id)?;
		self.calls.remove(&id).map(|call| (id, call))
	}

	pub fn drain(&mut self) -> Vec<PendingCall> {
		self.calls.drain().map(|(_, call)| call).collect()
	}

	pub fn len(&self) -> usize {
		self.calls.len()
	}
}

/// RAII guard removing a pending call when its request future is dropped
/// before a reply arrived (deadline elapsed or caller gave up).
pub(crate) struct CancelGuard {
	id: u64,
	shared: Weak<Shared>,
	completed: bool,
}

impl CancelGuard {
	pub fn new(id: u64, shared: Weak<Shared>) -> Self {
		Self {
			id,
			shared,
			completed: false,
		}
	}

	pub fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if let Some(shared) = self.shared.upgrade() {
			if shared.state.lock().pending.remove(self.id).is_some() {
				tracing::debug!(id = self.id, "removed abandoned pending call");
			}
		}
	}
}
