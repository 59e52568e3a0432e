//! Standalone testing mode: reach the engine host over SSH and run
//! `docker exec -it` there.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::time::timeout;

use super::protocol::{TerminalRequest, TerminalSize};
use super::shell::{RemoteConnection, ShellChannel, ShellConnector, ShellEvent};
use crate::configuration::SshDefaults;
use crate::error_handling::types::TerminalError;

/// Host keys are accepted unchecked, this mode only targets lab hosts.
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshShellConnector {
    defaults: SshDefaults,
    timeout: Duration,
}

impl SshShellConnector {
    pub fn new(defaults: SshDefaults, timeout: Duration) -> Self {
        Self { defaults, timeout }
    }

    /// The initiation message may point at another host; the account stays
    /// the configured one.
    fn target_host<'a>(&'a self, request: &'a TerminalRequest) -> &'a str {
        request.host_ip.as_deref().unwrap_or(&self.defaults.host)
    }
}

#[async_trait]
impl ShellConnector for SshShellConnector {
    async fn connect(
        &self,
        request: &TerminalRequest,
    ) -> Result<Box<dyn RemoteConnection>, TerminalError> {
        let host = self.target_host(request);
        info!(
            "Opening SSH connection to {}@{}:{}",
            self.defaults.user, host, self.defaults.port
        );

        let config = Arc::new(client::Config::default());
        let connecting = client::connect(config, (host, self.defaults.port), AcceptAnyHostKey);
        let mut handle = match timeout(self.timeout, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(TerminalError::Connection(format!("{}: {}", host, e))),
            Err(_) => {
                return Err(TerminalError::Connection(format!(
                    "{}: timed out after {}s",
                    host,
                    self.timeout.as_secs()
                )))
            }
        };

        let authenticating =
            handle.authenticate_password(self.defaults.user.clone(), self.defaults.password.clone());
        let accepted = match timeout(self.timeout, authenticating).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => return Err(TerminalError::Authentication(e.to_string())),
            Err(_) => {
                return Err(TerminalError::Connection(format!(
                    "{}: no authentication answer after {}s",
                    host,
                    self.timeout.as_secs()
                )))
            }
        };
        if !accepted {
            return Err(TerminalError::Authentication(format!(
                "password rejected for {}@{}",
                self.defaults.user, host
            )));
        }

        Ok(Box::new(SshConnection { handle }))
    }
}

struct SshConnection {
    handle: Handle<AcceptAnyHostKey>,
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_shell(
        &mut self,
        request: &TerminalRequest,
    ) -> Result<Box<dyn ShellChannel>, TerminalError> {
        let channel = self.handle.channel_open_session().await.map_err(remote)?;
        channel
            .request_pty(
                false,
                "xterm-color",
                request.size.cols as u32,
                request.size.rows as u32,
                0,
                0,
                &[],
            )
            .await
            .map_err(remote)?;
        channel
            .set_env(false, "TERM", "xterm-color")
            .await
            .map_err(remote)?;

        // run docker directly so exiting the container shell ends the channel
        let command = format!("docker exec -it {} {}", request.container_id, request.command);
        debug!("SSH exec: {}", command);
        channel.exec(true, command).await.map_err(remote)?;

        Ok(Box::new(SshShell { channel }))
    }

    async fn close(&mut self) -> Result<(), TerminalError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(remote)
    }
}

struct SshShell {
    channel: Channel<client::Msg>,
}

#[async_trait]
impl ShellChannel for SshShell {
    async fn next_event(&mut self) -> Result<ShellEvent, TerminalError> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(ShellEvent::Output(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(ShellEvent::Output(data.to_vec()))
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    return Ok(ShellEvent::Exited(Some(exit_status as i64)))
                }
                Some(ChannelMsg::Close) | None => return Ok(ShellEvent::Exited(None)),
                Some(other) => debug!("Ignoring SSH channel message {:?}", other),
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TerminalError> {
        self.channel.data(data).await.map_err(remote)
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), TerminalError> {
        self.channel
            .window_change(size.cols as u32, size.rows as u32, 0, 0)
            .await
            .map_err(remote)
    }

    async fn close(&mut self) -> Result<(), TerminalError> {
        self.channel.close().await.map_err(remote)
    }
}

fn remote(err: russh::Error) -> TerminalError {
    TerminalError::Remote(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::protocol::parse_initiation;

    fn connector() -> SshShellConnector {
        SshShellConnector::new(
            SshDefaults {
                host: "192.168.1.20".to_string(),
                port: 22,
                user: "ops".to_string(),
                password: "secret".to_string(),
            },
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_host_override_from_initiation() {
        let connector = connector();
        let plain = parse_initiation(r#"{"containerId":"web-1"}"#).unwrap();
        let overridden =
            parse_initiation(r#"{"containerId":"web-1","hostIp":"10.0.0.9"}"#).unwrap();

        assert_eq!(connector.target_host(&plain), "192.168.1.20");
        assert_eq!(connector.target_host(&overridden), "10.0.0.9");
    }

    #[tokio::test]
    async fn test_stalled_server_is_a_connection_error() {
        // greets like an SSH server, then never says another word
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let _ = tokio::io::AsyncWriteExt::write_all(
                    &mut socket,
                    b"SSH-2.0-OpenSSH_9.6\r\n",
                )
                .await;
                held.push(socket);
            }
        });

        let connector = SshShellConnector::new(
            SshDefaults {
                host: "127.0.0.1".to_string(),
                port,
                user: "ops".to_string(),
                password: "secret".to_string(),
            },
            Duration::from_millis(200),
        );
        let request = parse_initiation(r#"{"containerId":"web-1"}"#).unwrap();

        let outcome = timeout(Duration::from_secs(5), connector.connect(&request))
            .await
            .expect("connect must give up on its own");
        match outcome {
            Err(TerminalError::Connection(message)) => assert!(message.starts_with("127.0.0.1")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("a silent server cannot authenticate"),
        }
    }
}
