//! In-process transport backed by unbounded channels.
//!
//! Every [`MemoryConnector::open`] hands the far end of the new connection to
//! the accept channel as a [`MemoryPeer`], which plays the coordinator.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Connector, TransportParts, TransportReceiver, TransportSender};
use crate::error::{Error, Result};

/// How [`MemoryConnector::open`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryMode {
	#[default]
	Accept,
	/// Fails every open with a transport error.
	Refuse,
	/// Never completes an open.
	Stall,
}

pub struct MemoryConnector {
	peers: mpsc::UnboundedSender<MemoryPeer>,
	mode: MemoryMode,
}

impl MemoryConnector {
	/// Creates an accepting connector and the channel its peers arrive on.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
		Self::with_mode(MemoryMode::Accept)
	}

	pub fn with_mode(mode: MemoryMode) -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
		let (peers, accepted) = mpsc::unbounded_channel();
		(Self { peers, mode }, accepted)
	}
}

#[async_trait]
impl Connector for MemoryConnector {
	async fn open(&self, url: &str) -> Result<TransportParts> {
		match self.mode {
			MemoryMode::Accept => {}
			MemoryMode::Refuse => return Err(Error::Transport(format!("connection refused: {url}"))),
			MemoryMode::Stall => std::future::pending::<()>().await,
		}

		let (client_tx, server_rx) = mpsc::unbounded_channel();
		let (server_tx, client_rx) = mpsc::unbounded_channel();

		let peer = MemoryPeer {
			url: url.to_string(),
			inbound: server_rx,
			outbound: Some(server_tx),
		};
		self.peers
			.send(peer)
			.map_err(|_| Error::Transport(format!("no listener for {url}")))?;

		Ok(TransportParts {
			sender: Box::new(MemorySender { tx: Some(client_tx) }),
			receiver: Box::new(MemoryReceiver { rx: client_rx }),
		})
	}
}

/// Server side of an in-memory connection.
pub struct MemoryPeer {
	url: String,
	inbound: mpsc::UnboundedReceiver<String>,
	outbound: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryPeer {
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Next frame sent by the client; `None` once the client closed.
	pub async fn recv(&mut self) -> Option<String> {
		self.inbound.recv().await
	}

	/// A frame the client already sent, without waiting.
	pub fn try_recv(&mut self) -> Option<String> {
		self.inbound.try_recv().ok()
	}

	/// Delivers `frame` to the client. Returns `false` if the client is gone.
	pub fn send(&self, frame: impl Into<String>) -> bool {
		self.outbound.as_ref().is_some_and(|tx| tx.send(frame.into()).is_ok())
	}

	/// Closes the server side; the client sees the connection end.
	pub fn disconnect(&mut self) {
		self.outbound = None;
	}
}

struct MemorySender {
	tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl TransportSender for MemorySender {
	async fn send(&mut self, frame: String) -> Result<()> {
		let tx = self
			.tx
			.as_ref()
			.ok_or_else(|| Error::Transport("memory transport closed".to_string()))?;
		tx.send(frame)
			.map_err(|_| Error::Transport("memory peer hung up".to_string()))
	}

	async fn close(&mut self) -> Result<()> {
		self.tx = None;
		Ok(())
	}
}

struct MemoryReceiver {
	rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl TransportReceiver for MemoryReceiver {
	async fn run(mut self: Box<Self>, frames: mpsc::UnboundedSender<String>) -> Result<()> {
		while let Some(frame) = self.rx.recv().await {
			if frames.send(frame).is_err() {
				break;
			}
		}
		Ok(())
	}
}
