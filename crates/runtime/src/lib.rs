//! ClearNode Runtime - transport, authentication, and request correlation
//!
//! This crate drives a connection to a ClearNode coordinator:
//!
//! - **Transport**: text frames over WebSocket (or in-memory for tests)
//! - **Session**: connect, challenge-response authentication, close
//! - **Correlation**: request ids mapped to oneshot channels, many calls in flight
//! - **Signer**: the seam through which payloads and auth policies get signed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  SessionOrchestrator │  connect / authenticate / request / close
//! └──────────┬───────────┘
//!            │ Codec (clearnode-protocol)
//! ┌──────────▼───────────┐
//! │  writer │ reader │ dispatcher   background tasks per connection
//! └──────────┬───────────┘
//!            │ TransportSender / TransportReceiver
//! ┌──────────▼───────────┐
//! │  WebSocket / Memory  │
//! └──────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod signer;
pub mod transport;

pub use config::{CallOptions, SessionConfig};
pub use error::{Error, Result};
pub use session::{AuthPhase, AuthSession, Capabilities, ConnectionState, Identity, SessionOrchestrator};
pub use signer::{Signer, SignerError};
pub use transport::{
	Connector, MemoryConnector, MemoryMode, MemoryPeer, TransportParts, TransportReceiver, TransportSender, WebSocketConnector,
};

pub use clearnode_protocol as protocol;
