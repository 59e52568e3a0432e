use async_trait::async_trait;

use super::protocol::ServerFrame;
use crate::error_handling::types::TerminalError;

/// WebSocket close code for a client that broke the initiation contract.
pub const POLICY_VIOLATION: u16 = 1008;
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// The browser side of a terminal.
#[async_trait]
pub trait ClientSocket: Send {
    /// Next data message. Must be cancel safe: the proxy races it against
    /// the remote channel and drops it when the other side wins.
    async fn recv(&mut self) -> Result<ClientMessage, TerminalError>;

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TerminalError>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TerminalError>;
}
