//! Duplex text-frame transports.
//!
//! A [`Connector`] opens a connection and splits it into a
//! [`TransportSender`] (owned by the writer task) and a [`TransportReceiver`]
//! (owned by the reader task). Frames are opaque text; decoding happens in the
//! session layer.

mod memory;
mod websocket;


use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub use memory::{MemoryConnector, MemoryMode, MemoryPeer};
pub use websocket::{WebSocketConnector, WebSocketReceiver, WebSocketSender};

/// Write half of an open transport.
#[async_trait]
pub trait TransportSender: Send {
	async fn send(&mut self, frame: String) -> Result<()>;

	/// Closes the connection gracefully. Further sends fail.
	async fn close(&mut self) -> Result<()>;
}

/// Read half of an open transport.
#[async_trait]
pub trait TransportReceiver: Send {
	/// Pumps inbound frames into `frames` until the peer closes the connection
	/// (`Ok`) or the transport fails (`Err`). Returns early once `frames` is
	/// dropped.
	async fn run(self: Box<Self>, frames: mpsc::UnboundedSender<String>) -> Result<()>;
}

/// Both halves of a freshly opened transport.
pub struct TransportParts {
	pub sender: Box<dyn TransportSender>,
	pub receiver: Box<dyn TransportReceiver>,
}

/// Opens transports to a coordinator endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn open(&self, url: &str) -> Result<TransportParts>;
}
