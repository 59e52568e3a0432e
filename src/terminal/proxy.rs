use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{sleep_until, timeout, Instant};

use super::protocol::{
    classify, parse_initiation, ClientInput, ServerFrame, TerminalRequest, TerminalSize, Utf8Carry,
};
use super::shell::{RemoteConnection, ShellChannel, ShellConnector, ShellEvent};
use super::socket::{ClientMessage, ClientSocket, NORMAL_CLOSURE, POLICY_VIOLATION};
use crate::error_handling::types::{InitiationError, TerminalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Initiating,
    Authenticating,
    ShellAttached,
    Proxying,
    Closed,
}

/// Why a terminal ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    ClientClosed,
    RemoteExited(Option<i64>),
    IdleTimeout,
    InitiationFailed(InitiationError),
    Error(TerminalError),
}

#[derive(Debug, Clone, Copy)]
pub struct ProxySettings {
    pub init_timeout: Duration,
    pub idle_timeout: Duration,
}

/// One interactive shell proxied between a client socket and a remote
/// channel.
///
/// [`run`](TerminalProxy::run) consumes the proxy, so the teardown at its
/// end happens exactly once per terminal.
pub struct TerminalProxy<S: ClientSocket> {
    client: S,
    connector: Arc<dyn ShellConnector>,
    settings: ProxySettings,
    state: TerminalState,
    size: Option<TerminalSize>,
}

impl<S: ClientSocket> TerminalProxy<S> {
    pub fn new(client: S, connector: Arc<dyn ShellConnector>, settings: ProxySettings) -> Self {
        Self {
            client,
            connector,
            settings,
            state: TerminalState::Initiating,
            size: None,
        }
    }

    pub async fn run(mut self) -> CloseReason {
        let mut connection: Option<Box<dyn RemoteConnection>> = None;
        let mut channel: Option<Box<dyn ShellChannel>> = None;

        let reason = self.drive(&mut connection, &mut channel).await;
        self.teardown(channel, connection, &reason).await;
        reason
    }

    async fn drive(
        &mut self,
        connection: &mut Option<Box<dyn RemoteConnection>>,
        channel: &mut Option<Box<dyn ShellChannel>>,
    ) -> CloseReason {
        let request = match self.await_initiation().await {
            Ok(request) => request,
            Err(reason) => return reason,
        };

        self.transition(TerminalState::Authenticating);
        let conn = match self.connector.connect(&request).await {
            Ok(conn) => connection.insert(conn),
            Err(e) => return self.fail(e).await,
        };

        self.transition(TerminalState::ShellAttached);
        let shell = match conn.open_shell(&request).await {
            Ok(shell) => channel.insert(shell),
            Err(e) => return self.fail(e).await,
        };
        if let Err(e) = shell.resize(request.size).await {
            return self.fail(e).await;
        }
        self.size = Some(request.size);

        let banner = format!(
            "Attempting to connect to container {}...\r\n",
            request.container_id
        );
        if let Err(e) = self.client.send(&ServerFrame::Output(banner)).await {
            debug!("Client went away before proxying: {}", e);
            return CloseReason::ClientClosed;
        }

        self.transition(TerminalState::Proxying);
        self.proxy(shell).await
    }

    async fn await_initiation(&mut self) -> Result<TerminalRequest, CloseReason> {
        let first = match timeout(self.settings.init_timeout, self.client.recv()).await {
            Err(_) => String::new(),
            Ok(Ok(ClientMessage::Text(text))) => text,
            Ok(Ok(ClientMessage::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Ok(ClientMessage::Close)) => return Err(CloseReason::ClientClosed),
            Ok(Err(e)) => {
                debug!("Client socket failed during initiation: {}", e);
                return Err(CloseReason::ClientClosed);
            }
        };

        parse_initiation(&first).map_err(|e| {
            warn!("Terminal initiation rejected: {}", e);
            CloseReason::InitiationFailed(e)
        })
    }

    /// Waits on whichever side is ready first; each wakeup is activity and
    /// pushes the idle deadline back.
    async fn proxy(&mut self, shell: &mut Box<dyn ShellChannel>) -> CloseReason {
        let idle = self.settings.idle_timeout;
        let mut deadline = Instant::now() + idle;
        let mut decoder = Utf8Carry::default();

        loop {
            tokio::select! {
                message = self.client.recv() => {
                    deadline = Instant::now() + idle;
                    let input = match message {
                        Ok(ClientMessage::Text(text)) => classify(&text),
                        Ok(ClientMessage::Binary(bytes)) => ClientInput::Input(bytes),
                        Ok(ClientMessage::Close) => return CloseReason::ClientClosed,
                        Err(e) => {
                            debug!("Client socket failed: {}", e);
                            return CloseReason::ClientClosed;
                        }
                    };
                    match input {
                        ClientInput::Resize(size) => {
                            if let Err(e) = shell.resize(size).await {
                                return self.fail(e).await;
                            }
                            debug!("Terminal resized to {}x{}", size.cols, size.rows);
                            self.size = Some(size);
                        }
                        ClientInput::Input(bytes) => {
                            if let Err(e) = shell.write(&bytes).await {
                                return self.fail(e).await;
                            }
                        }
                    }
                }
                event = shell.next_event() => {
                    deadline = Instant::now() + idle;
                    match event {
                        Ok(ShellEvent::Output(bytes)) => {
                            let text = decoder.decode(&bytes);
                            if text.is_empty() {
                                continue;
                            }
                            if let Err(e) = self.client.send(&ServerFrame::Output(text)).await {
                                debug!("Client socket failed: {}", e);
                                return CloseReason::ClientClosed;
                            }
                        }
                        Ok(ShellEvent::Exited(code)) => {
                            let rest = decoder.finish();
                            if !rest.is_empty() {
                                let _ = self.client.send(&ServerFrame::Output(rest)).await;
                            }
                            return CloseReason::RemoteExited(code);
                        }
                        Err(e) => return self.fail(e).await,
                    }
                }
                _ = sleep_until(deadline) => {
                    info!("Terminal idle for {}s, closing", idle.as_secs());
                    return CloseReason::IdleTimeout;
                }
            }
        }
    }

    async fn fail(&mut self, err: TerminalError) -> CloseReason {
        warn!("Terminal error: {}", err);
        let frame = ServerFrame::Error(format!("Error: {}", err));
        if let Err(e) = self.client.send(&frame).await {
            debug!("Could not deliver terminal error frame: {}", e);
        }
        CloseReason::Error(err)
    }

    /// Channel, then connection, then client socket. Failures are logged and
    /// never stop the next step.
    async fn teardown(
        &mut self,
        channel: Option<Box<dyn ShellChannel>>,
        connection: Option<Box<dyn RemoteConnection>>,
        reason: &CloseReason,
    ) {
        if let Some(mut channel) = channel {
            if let Err(e) = channel.close().await {
                warn!("Failed to close remote channel: {}", e);
            }
        }
        if let Some(mut connection) = connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close remote connection: {}", e);
            }
        }

        let (code, text) = match reason {
            CloseReason::InitiationFailed(e) => {
                if let Some(message) = e.client_error() {
                    if let Err(err) = self.client.send(&ServerFrame::Error(message)).await {
                        debug!("Could not deliver initiation error: {}", err);
                    }
                }
                (POLICY_VIOLATION, e.close_reason())
            }
            CloseReason::IdleTimeout => (NORMAL_CLOSURE, "Session idle timeout."),
            CloseReason::RemoteExited(_) => (NORMAL_CLOSURE, "Remote process exited."),
            CloseReason::ClientClosed | CloseReason::Error(_) => (NORMAL_CLOSURE, ""),
        };
        if let Err(e) = self.client.close(code, text).await {
            debug!("Client socket already closed: {}", e);
        }

        self.transition(TerminalState::Closed);
        info!("Terminal closed ({:?}, last size {:?})", reason, self.size);
    }

    fn transition(&mut self, next: TerminalState) {
        debug!("Terminal {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
