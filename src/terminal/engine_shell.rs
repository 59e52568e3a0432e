use std::pin::Pin;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures::{Stream, StreamExt};
use log::{debug, info};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::protocol::{TerminalRequest, TerminalSize};
use super::shell::{RemoteConnection, ShellChannel, ShellConnector, ShellEvent};
use crate::container_engine::sources::output_bytes;
use crate::container_engine::EngineDescriptor;
use crate::error_handling::types::{ConnectionError, TerminalError};

type ExecOutput = Pin<Box<dyn Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send>>;
type ExecInput = Pin<Box<dyn AsyncWrite + Send>>;

/// Runs the shell as a TTY exec inside the container, through the session's
/// own engine endpoint.
pub struct EngineShellConnector {
    descriptor: EngineDescriptor,
}

impl EngineShellConnector {
    pub fn new(descriptor: EngineDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl ShellConnector for EngineShellConnector {
    async fn connect(
        &self,
        _request: &TerminalRequest,
    ) -> Result<Box<dyn RemoteConnection>, TerminalError> {
        let docker = self.descriptor.open()?;
        docker.ping().await.map_err(ConnectionError::from)?;
        info!("Terminal engine connection to {} established", self.descriptor.endpoint);
        Ok(Box::new(EngineConnection {
            docker: Some(docker),
        }))
    }
}

struct EngineConnection {
    docker: Option<Docker>,
}

#[async_trait]
impl RemoteConnection for EngineConnection {
    async fn open_shell(
        &mut self,
        request: &TerminalRequest,
    ) -> Result<Box<dyn ShellChannel>, TerminalError> {
        let docker = self
            .docker
            .as_ref()
            .ok_or_else(|| TerminalError::Connection("engine client already released".to_string()))?;
        let options = CreateExecOptions {
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            env: Some(vec!["TERM=xterm-color".to_string()]),
            cmd: Some(request.argv()),
            ..Default::default()
        };
        let exec = docker
            .create_exec(&request.container_id, options)
            .await
            .map_err(|e| exec_error(e, &request.container_id))?;

        let started = docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    tty: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| exec_error(e, &request.container_id))?;

        match started {
            StartExecResults::Attached { output, input } => {
                debug!("Exec {} attached in {}", exec.id, request.container_id);
                Ok(Box::new(EngineShell {
                    docker: docker.clone(),
                    exec_id: exec.id,
                    output,
                    input,
                    finished: false,
                }))
            }
            StartExecResults::Detached => Err(TerminalError::Remote(
                "Engine started the shell detached".to_string(),
            )),
        }
    }

    async fn close(&mut self) -> Result<(), TerminalError> {
        if self.docker.take().is_some() {
            debug!("Released terminal engine client");
        }
        Ok(())
    }
}

struct EngineShell {
    docker: Docker,
    exec_id: String,
    output: ExecOutput,
    input: ExecInput,
    finished: bool,
}

#[async_trait]
impl ShellChannel for EngineShell {
    async fn next_event(&mut self) -> Result<ShellEvent, TerminalError> {
        if !self.finished {
            match self.output.next().await {
                Some(Ok(chunk)) => return Ok(ShellEvent::Output(output_bytes(&chunk).to_vec())),
                Some(Err(e)) => return Err(TerminalError::Remote(e.to_string())),
                None => self.finished = true,
            }
        }
        let code = match self.docker.inspect_exec(&self.exec_id).await {
            Ok(inspect) => inspect.exit_code,
            Err(e) => {
                debug!("Could not inspect exec {}: {}", self.exec_id, e);
                None
            }
        };
        Ok(ShellEvent::Exited(code))
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TerminalError> {
        self.input
            .write_all(data)
            .await
            .map_err(|e| TerminalError::Remote(e.to_string()))?;
        self.input
            .flush()
            .await
            .map_err(|e| TerminalError::Remote(e.to_string()))
    }

    async fn resize(&mut self, size: TerminalSize) -> Result<(), TerminalError> {
        self.docker
            .resize_exec(
                &self.exec_id,
                ResizeExecOptions {
                    height: size.rows,
                    width: size.cols,
                },
            )
            .await
            .map_err(|e| TerminalError::Remote(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TerminalError> {
        self.input
            .shutdown()
            .await
            .map_err(|e| TerminalError::Remote(e.to_string()))
    }
}

fn exec_error(err: bollard::errors::Error, container: &str) -> TerminalError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => TerminalError::Remote(format!("Container {} not found", container)),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message,
        } => TerminalError::Remote(message),
        other => TerminalError::Remote(other.to_string()),
    }
}
