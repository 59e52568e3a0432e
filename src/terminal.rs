//! Interactive terminal proxy.
//!
//! A browser opens a WebSocket, sends one initiation message and from then
//! on exchanges keystrokes and output with a PTY backed shell inside the
//! target container. The shell is reached either through the session's
//! engine endpoint or, in standalone testing mode, over SSH.

pub mod engine_shell;
pub mod protocol;
pub mod proxy;
pub mod shell;
pub mod socket;
pub mod ssh_shell;
pub mod websocket;


use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::configuration::SshDefaults;
use crate::container_engine::EngineDescriptor;
use crate::error_handling::types::TerminalError;

pub use proxy::{CloseReason, ProxySettings, TerminalProxy, TerminalState};
pub use shell::{ShellConnector, UnavailableConnector};
pub use socket::ClientSocket;
pub use websocket::WarpSocket;

/// Picks the shell backend for one terminal: the client's session when it
/// has one, else the configured SSH defaults.
pub fn select_connector(
    session: Result<EngineDescriptor, TerminalError>,
    ssh: Option<&SshDefaults>,
    timeout: Duration,
) -> Arc<dyn ShellConnector> {
    match (session, ssh) {
        (Ok(descriptor), _) => {
            debug!("Terminal uses engine exec on {}", descriptor.endpoint);
            Arc::new(engine_shell::EngineShellConnector::new(descriptor))
        }
        (Err(_), Some(defaults)) => {
            debug!("Terminal uses SSH to {}", defaults.host);
            Arc::new(ssh_shell::SshShellConnector::new(defaults.clone(), timeout))
        }
        (Err(e), None) => Arc::new(UnavailableConnector::new(e.to_string())),
    }
}
