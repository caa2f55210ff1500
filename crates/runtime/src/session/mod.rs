//! Session orchestration on top of a transport.
//!
//! A [`SessionOrchestrator`] owns one connection at a time and drives it
//! through connect, authenticate, any number of correlated requests, and
//! close.
//!
//! # Message Flow
//!
//! 1. `request()` allocates a request id and a oneshot channel
//! 2. The payload is signed, framed, and queued for the writer task
//! 3. The caller awaits the oneshot receiver, bounded by its deadline
//! 4. The reader task pumps inbound frames to the dispatcher
//! 5. The dispatcher decodes each frame and correlates it by request id
//! 6. The matching oneshot sender is completed; the caller resumes
//!
//! Handshake frames that match no pending call are routed to the in-flight
//! `authenticate()`; everything else is published to [`subscribe`] receivers
//! or dropped.
//!
//! [`subscribe`]: SessionOrchestrator::subscribe

mod auth;
mod pending;
mod rpc;


use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clearnode_protocol::{Codec, InboundMessage, NitroRpcCodec, RequestEnvelope, RpcMethod};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub use auth::{AuthPhase, AuthSession, Capabilities, Identity};
use pending::{CancelGuard, PendingCall, PendingCalls};

use crate::config::{CallOptions, SessionConfig};
use crate::error::{Error, Result};
use crate::signer::Signer;
use crate::transport::{Connector, TransportParts};

/// Lifecycle of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Connecting,
	Open,
	/// No live connection: never connected, closed, or lost.
	Closed,
}

enum Outbound {
	Frame(String),
	Close,
}

struct Handshake {
	token: u64,
	/// Request id whose reply the handshake is waiting for.
	awaiting: Option<u64>,
	tx: mpsc::UnboundedSender<Result<InboundMessage>>,
}

impl Handshake {
	fn accepts(&self, correlation_id: Option<u64>) -> bool {
		correlation_id.is_none() || correlation_id == self.awaiting
	}
}

struct State {
	connection: ConnectionState,
	auth: AuthPhase,
	url: Option<String>,
	/// Bumped on every successful connect so events from an earlier
	/// connection's tasks are ignored.
	generation: u64,
	pending: PendingCalls,
	handshake: Option<Handshake>,
	outbound: Option<mpsc::UnboundedSender<Outbound>>,
	writer: Option<JoinHandle<()>>,
	reader: Option<JoinHandle<()>>,
	dispatcher: Option<JoinHandle<()>>,
}

impl State {
	fn new() -> Self {
		Self {
			connection: ConnectionState::Closed,
			auth: AuthPhase::Idle,
			url: None,
			generation: 0,
			pending: PendingCalls::default(),
			handshake: None,
			outbound: None,
			writer: None,
			reader: None,
			dispatcher: None,
		}
	}
}

/// State shared between the orchestrator and its background tasks.
pub(crate) struct Shared {
	state: Mutex<State>,
	notifications: broadcast::Sender<InboundMessage>,
}

impl Shared {
	fn dispatch(&self, codec: &dyn Codec, frame: &str) {
		let message = match codec.decode(frame) {
			Ok(message) => message,
			Err(e) => {
				warn!(error = %e, frame = preview(frame), "dropping malformed frame");
				return;
			}
		};

		debug!(method = %message.method, id = ?message.correlation_id, "inbound frame");

		let mut state = self.state.lock();
		if let Some((id, call)) = state.pending.take_match(&message) {
			drop(state);
			debug!(
				id,
				method = %call.method,
				elapsed_ms = call.created.elapsed().as_millis() as u64,
				"reply correlated"
			);
			let result = match message.error {
				Some(reason) => Err(Error::Remote {
					method: call.method.to_string(),
					message: reason,
				}),
				None => Ok(message.params),
			};
			let _ = call.tx.send(result);
			return;
		}

		if message.method.is_handshake() {
			if let Some(handshake) = &state.handshake {
				if !handshake.accepts(message.correlation_id) {
					debug!(
						method = %message.method,
						id = ?message.correlation_id,
						awaiting = ?handshake.awaiting,
						"dropping handshake frame for an earlier request"
					);
					return;
				}
				if handshake.tx.send(Ok(message.clone())).is_ok() {
					return;
				}
			}
		}
		drop(state);

		if let Err(broadcast::error::SendError(message)) = self.notifications.send(message) {
			debug!(method = %message.method, id = ?message.correlation_id, "dropping uncorrelated frame");
		}
	}

	fn connection_lost(&self, generation: u64, reason: String) {
		let (pending, handshake, outbound) = {
			let mut state = self.state.lock();
			if state.generation != generation || state.connection == ConnectionState::Closed {
				return;
			}
			state.connection = ConnectionState::Closed;
			state.auth = AuthPhase::Idle;
			(state.pending.drain(), state.handshake.take(), state.outbound.take())
		};

		warn!(reason = %reason, outstanding = pending.len(), "connection lost");

		for call in pending {
			let _ = call.tx.send(Err(Error::Transport(reason.clone())));
		}
		if let Some(handshake) = handshake {
			let _ = handshake.tx.send(Err(Error::Transport(reason.clone())));
		}
		if let Some(outbound) = outbound {
			let _ = outbound.send(Outbound::Close);
		}
	}
}

/// Drives one ClearNode connection through connect, authenticate, request, close.
pub struct SessionOrchestrator {
	connector: Arc<dyn Connector>,
	signer: Arc<dyn Signer>,
	codec: Arc<dyn Codec>,
	config: SessionConfig,
	shared: Arc<Shared>,
	/// Request ids start at 1; 0 marks uncorrelated frames on the wire.
	next_id: AtomicU64,
	next_handshake: AtomicU64,
}

impl SessionOrchestrator {
	/// Creates an orchestrator speaking NitroRPC.
	pub fn new(connector: Arc<dyn Connector>, signer: Arc<dyn Signer>, config: SessionConfig) -> Self {
		Self::with_codec(connector, signer, Arc::new(NitroRpcCodec), config)
	}

	pub fn with_codec(connector: Arc<dyn Connector>, signer: Arc<dyn Signer>, codec: Arc<dyn Codec>, config: SessionConfig) -> Self {
		let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
		Self {
			connector,
			signer,
			codec,
			config,
			shared: Arc::new(Shared {
				state: Mutex::new(State::new()),
				notifications,
			}),
			next_id: AtomicU64::new(1),
			next_handshake: AtomicU64::new(1),
		}
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn signer(&self) -> &Arc<dyn Signer> {
		&self.signer
	}

	pub fn connection_state(&self) -> ConnectionState {
		self.shared.state.lock().connection
	}

	pub fn auth_phase(&self) -> AuthPhase {
		self.shared.state.lock().auth
	}

	/// Endpoint of the current or most recent connection.
	pub fn url(&self) -> Option<String> {
		self.shared.state.lock().url.clone()
	}

	/// Number of requests still awaiting a reply.
	pub fn pending_calls(&self) -> usize {
		self.shared.state.lock().pending.len()
	}

	/// Receives inbound frames that answered no pending call (server pushes).
	pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
		self.shared.notifications.subscribe()
	}

	/// Opens the transport to `url` and starts the reader, writer, and dispatch tasks.
	///
	/// # Errors
	///
	/// - [`Error::InvalidState`] if a connection is already open or opening
	/// - [`Error::Transport`] if the open fails or exceeds the connect timeout
	/// - [`Error::Cancelled`] if `close()` ran while the open was in progress
	pub async fn connect(&self, url: &str) -> Result<()> {
		{
			let mut state = self.shared.state.lock();
			if state.connection != ConnectionState::Closed {
				return Err(Error::InvalidState(format!("cannot connect while {:?}", state.connection)));
			}
			state.connection = ConnectionState::Connecting;
			state.auth = AuthPhase::Idle;
			state.url = Some(url.to_string());
		}

		info!(url, "connecting");

		let timeout = self.config.connect_timeout;
		let opened = match tokio::time::timeout(timeout, self.connector.open(url)).await {
			Ok(opened) => opened,
			Err(_) => Err(Error::Transport(format!("timed out after {}ms opening {url}", timeout.as_millis()))),
		};

		let TransportParts { mut sender, receiver } = match opened {
			Ok(parts) => parts,
			Err(e) => {
				let mut state = self.shared.state.lock();
				if state.connection == ConnectionState::Connecting {
					state.connection = ConnectionState::Closed;
				}
				error!(url, error = %e, "connect failed");
				return Err(e);
			}
		};

		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
		let generation = {
			let mut state = self.shared.state.lock();
			if state.connection != ConnectionState::Connecting {
				None
			} else {
				state.generation += 1;
				state.connection = ConnectionState::Open;
				state.outbound = Some(outbound_tx);
				Some(state.generation)
			}
		};
		let Some(generation) = generation else {
			debug!(url, "connection closed while opening");
			let _ = sender.close().await;
			return Err(Error::Cancelled);
		};

		let writer = tokio::spawn({
			let shared = Arc::clone(&self.shared);
			async move {
				while let Some(outbound) = outbound_rx.recv().await {
					match outbound {
						Outbound::Frame(frame) => {
							if let Err(e) = sender.send(frame).await {
								error!(error = %e, "transport write error");
								shared.connection_lost(generation, e.to_string());
								break;
							}
						}
						Outbound::Close => break,
					}
				}
				if let Err(e) = sender.close().await {
					debug!(error = %e, "transport close failed");
				}
			}
		});

		let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
		let (done_tx, done_rx) = oneshot::channel::<Result<()>>();

		let reader = tokio::spawn(async move {
			let _ = done_tx.send(receiver.run(frames_tx).await);
		});

		let dispatcher = tokio::spawn({
			let shared = Arc::clone(&self.shared);
			let codec = Arc::clone(&self.codec);
			async move {
				while let Some(frame) = frames_rx.recv().await {
					shared.dispatch(codec.as_ref(), &frame);
				}
				let reason = match done_rx.await {
					Ok(Ok(())) => "connection closed by peer".to_string(),
					Ok(Err(e)) => {
						error!(error = %e, "transport read error");
						e.to_string()
					}
					Err(_) => "transport reader stopped".to_string(),
				};
				shared.connection_lost(generation, reason);
			}
		});

		{
			let mut state = self.shared.state.lock();
			state.writer = Some(writer);
			state.reader = Some(reader);
			state.dispatcher = Some(dispatcher);
		}

		info!(url, "connected");
		Ok(())
	}

	/// Sends a signed request and waits for its correlated reply.
	pub async fn request(&self, method: impl Into<RpcMethod>, params: Value) -> Result<Value> {
		self.request_with(method, params, CallOptions::default()).await
	}

	/// Like [`request`](Self::request) with per-call signing and deadline.
	///
	/// # Errors
	///
	/// - [`Error::NotAuthenticated`] before the handshake succeeded; nothing is sent
	/// - [`Error::Timeout`] if no reply arrives in time; the pending call is removed
	/// - [`Error::Remote`] if the coordinator answers with an error frame
	/// - [`Error::Cancelled`] if the session is closed while waiting
	/// - [`Error::Transport`] if the connection is lost while waiting
	pub async fn request_with(&self, method: impl Into<RpcMethod>, params: Value, options: CallOptions) -> Result<Value> {
		let method = method.into();
		if self.auth_phase() != AuthPhase::Verified {
			return Err(Error::NotAuthenticated);
		}

		let envelope = RequestEnvelope::new(self.next_request_id(), method.clone(), params);
		let frame = self.frame(&envelope, options.sign).await?;
		let timeout = options.timeout.unwrap_or(self.config.request_timeout);
		let id = envelope.id;

		let (tx, rx) = oneshot::channel();
		{
			let mut state = self.shared.state.lock();
			// Re-checked: close() or a lost connection may have run while signing.
			if state.auth != AuthPhase::Verified {
				return Err(Error::NotAuthenticated);
			}
			let Some(outbound) = state.outbound.clone() else {
				return Err(Error::Transport("connection is not open".to_string()));
			};
			let call = PendingCall {
				method: method.clone(),
				created: Instant::now(),
				tx,
			};
			if !state.pending.insert(id, call) {
				return Err(Error::InvalidState(format!("request id {id} is already outstanding")));
			}
			if outbound.send(Outbound::Frame(frame)).is_err() {
				state.pending.remove(id);
				return Err(Error::Transport("writer task stopped".to_string()));
			}
		}

		let mut guard = CancelGuard::new(id, Arc::downgrade(&self.shared));
		debug!(id, %method, timeout_ms = timeout.as_millis() as u64, "request sent");

		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(result)) => {
				guard.complete();
				result
			}
			Ok(Err(_)) => {
				guard.complete();
				Err(Error::Cancelled)
			}
			Err(_) => {
				drop(guard);
				warn!(id, %method, timeout_ms = timeout.as_millis() as u64, "request timed out");
				Err(Error::Timeout {
					method: method.to_string(),
					timeout,
				})
			}
		}
	}

	/// Fails outstanding calls with [`Error::Cancelled`], closes the transport,
	/// and moves the connection to [`ConnectionState::Closed`]. Idempotent.
	pub async fn close(&self) {
		let (pending, handshake, outbound, writer, reader, dispatcher) = {
			let mut state = self.shared.state.lock();
			if state.connection == ConnectionState::Closed && state.outbound.is_none() && state.writer.is_none() {
				return;
			}
			state.connection = ConnectionState::Closed;
			state.auth = AuthPhase::Idle;
			(
				state.pending.drain(),
				state.handshake.take(),
				state.outbound.take(),
				state.writer.take(),
				state.reader.take(),
				state.dispatcher.take(),
			)
		};

		info!(cancelled = pending.len(), "closing session");

		for call in pending {
			let _ = call.tx.send(Err(Error::Cancelled));
		}
		if let Some(handshake) = handshake {
			let _ = handshake.tx.send(Err(Error::Cancelled));
		}
		if let Some(outbound) = outbound {
			let _ = outbound.send(Outbound::Close);
		}
		if let Some(writer) = writer {
			if tokio::time::timeout(self.config.connect_timeout, writer).await.is_err() {
				debug!("writer did not finish closing in time");
			}
		}
		if let Some(reader) = reader {
			reader.abort();
		}
		if let Some(dispatcher) = dispatcher {
			dispatcher.abort();
		}
	}

	fn next_request_id(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::SeqCst)
	}

	/// Signs (optionally) and frames `envelope`.
	async fn frame(&self, envelope: &RequestEnvelope, sign: bool) -> Result<String> {
		let signatures = if sign {
			let payload = self.codec.payload(envelope)?;
			vec![self.signer.sign_raw(&payload).await?]
		} else {
			Vec::new()
		};
		Ok(self.codec.encode(envelope, &signatures)?)
	}

	fn send_frame(&self, frame: String) -> Result<()> {
		let state = self.shared.state.lock();
		let outbound = state
			.outbound
			.as_ref()
			.ok_or_else(|| Error::Transport("connection is not open".to_string()))?;
		outbound
			.send(Outbound::Frame(frame))
			.map_err(|_| Error::Transport("writer task stopped".to_string()))
	}
}

impl Drop for SessionOrchestrator {
	fn drop(&mut self) {
		let mut state = self.shared.state.lock();
		state.connection = ConnectionState::Closed;
		if let Some(outbound) = state.outbound.take() {
			let _ = outbound.send(Outbound::Close);
		}
		if let Some(reader) = state.reader.take() {
			reader.abort();
		}
		if let Some(dispatcher) = state.dispatcher.take() {
			dispatcher.abort();
		}
	}
}

/// First 200 characters of a frame, for diagnostics.
fn preview(frame: &str) -> &str {
	let end = frame.char_indices().nth(200).map(|(i, _)| i).unwrap_or(frame.len());
	&frame[..end]
}
