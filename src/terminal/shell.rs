//! Remote shell backends.
//!
//! A [`ShellConnector`] authenticates against some remote host and yields a
//! [`RemoteConnection`], which in turn opens one PTY backed
//! [`ShellChannel`] running the requested command inside the target
//! container.

use async_trait::async_trait;

use super::protocol::{TerminalRequest, TerminalSize};
use crate::error_handling::types::TerminalError;

#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Output(Vec<u8>),
    /// The remote process ended, with its exit code when one is known.
    Exited(Option<i64>),
}

#[async_trait]
pub trait ShellChannel: Send {
    /// Must be cancel safe, see [`ClientSocket::recv`].
    ///
    /// [`ClientSocket::recv`]: super::socket::ClientSocket::recv
    async fn next_event(&mut self) -> Result<ShellEvent, TerminalError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), TerminalError>;

    async fn resize(&mut self, size: TerminalSize) -> Result<(), TerminalError>;

    async fn close(&mut self) -> Result<(), TerminalError>;
}

#[async_trait]
pub trait RemoteConnection: Send {
    async fn open_shell(
        &mut self,
        request: &TerminalRequest,
    ) -> Result<Box<dyn ShellChannel>, TerminalError>;

    async fn close(&mut self) -> Result<(), TerminalError>;
}

#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(
        &self,
        request: &TerminalRequest,
    ) -> Result<Box<dyn RemoteConnection>, TerminalError>;
}

/// Used when the client has neither a session nor standalone SSH defaults.
pub struct UnavailableConnector {
    message: String,
}

impl UnavailableConnector {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ShellConnector for UnavailableConnector {
    async fn connect(
        &self,
        _request: &TerminalRequest,
    ) -> Result<Box<dyn RemoteConnection>, TerminalError> {
        Err(TerminalError::NotConnected(self.message.clone()))
    }
}
