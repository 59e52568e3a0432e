use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::trace;
use warp::ws::{Message, WebSocket};

use super::protocol::ServerFrame;
use super::socket::{ClientMessage, ClientSocket};
use crate::error_handling::types::TerminalError;

/// [`ClientSocket`] over an upgraded warp WebSocket.
pub struct WarpSocket {
    inner: WebSocket,
}

impl WarpSocket {
    pub fn new(inner: WebSocket) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ClientSocket for WarpSocket {
    async fn recv(&mut self) -> Result<ClientMessage, TerminalError> {
        loop {
            let message = match self.inner.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TerminalError::Client(e.to_string())),
                None => return Ok(ClientMessage::Close),
            };
            if message.is_close() {
                return Ok(ClientMessage::Close);
            }
            if let Ok(text) = message.to_str() {
                return Ok(ClientMessage::Text(text.to_string()));
            }
            if message.is_binary() {
                return Ok(ClientMessage::Binary(message.into_bytes()));
            }
            trace!("Skipping websocket control frame");
        }
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TerminalError> {
        self.inner
            .send(Message::text(frame.to_json()))
            .await
            .map_err(|e| TerminalError::Client(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TerminalError> {
        self.inner
            .send(Message::close_with(code, reason.to_string()))
            .await
            .map_err(|e| TerminalError::Client(e.to_string()))?;
        SinkExt::close(&mut self.inner)
            .await
            .map_err(|e| TerminalError::Client(e.to_string()))
    }
}
