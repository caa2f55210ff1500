use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Connector, TransportParts, TransportReceiver, TransportSender};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` and `wss://` connections (rustls with webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
	async fn open(&self, url: &str) -> Result<TransportParts> {
		let (stream, response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::Transport(format!("failed to open {url}: {e}")))?;

		debug!(url, status = %response.status(), "websocket handshake complete");

		let (sink, stream) = stream.split();
		Ok(TransportParts {
			sender: Box::new(WebSocketSender { sink }),
			receiver: Box::new(WebSocketReceiver { stream }),
		})
	}
}

pub struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
	async fn send(&mut self, frame: String) -> Result<()> {
		self.sink
			.send(Message::Text(frame))
			.await
			.map_err(|e| Error::Transport(format!("websocket send failed: {e}")))
	}

	async fn close(&mut self) -> Result<()> {
		self.sink
			.close()
			.await
			.map_err(|e| Error::Transport(format!("websocket close failed: {e}")))
	}
}

pub struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
	async fn run(mut self: Box<Self>, frames: mpsc::UnboundedSender<String>) -> Result<()> {
		while let Some(message) = self.stream.next().await {
			let text = match message {
				Ok(Message::Text(text)) => text,
				Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
					Ok(text) => text,
					Err(e) => {
						warn!(error = %e, "dropping non-UTF-8 binary frame");
						continue;
					}
				},
				Ok(Message::Close(frame)) => {
					debug!(?frame, "websocket closed by peer");
					return Ok(());
				}
				Ok(_) => continue,
				Err(e) => return Err(Error::Transport(format!("websocket read failed: {e}"))),
			};

			if frames.send(text).is_err() {
				return Ok(());
			}
		}
		Ok(())
	}
}
