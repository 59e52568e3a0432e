use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::watch;

use super::routes::routes;
use crate::configuration::{Config, SshDefaults};
use crate::container_engine::EngineDescriptor;
use crate::error_handling::types::{SessionError, WebError};
use crate::session_management::{SessionId, SessionManager};
use crate::terminal::ProxySettings;

/// What every handler shares.
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub log_tail: u32,
    pub ssh: Option<SshDefaults>,
    pub engine_timeout: Duration,
    pub terminal: ProxySettings,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, config: &Config) -> Self {
        Self {
            sessions,
            log_tail: config.log_tail,
            ssh: config.ssh.clone(),
            engine_timeout: config.engine_timeout,
            terminal: ProxySettings {
                init_timeout: config.terminal_init_timeout,
                idle_timeout: config.terminal_idle_timeout,
            },
            shutdown: watch::Sender::new(false),
        }
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`AppState::begin_shutdown`] has been called.
    pub fn stopping(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut stopping = self.shutdown.subscribe();
        async move {
            let _ = stopping.wait_for(|stopping| *stopping).await;
        }
    }

    /// Descriptor for the caller's session, captured once per request.
    pub fn resolve(&self, session: Option<&SessionId>) -> Result<EngineDescriptor, SessionError> {
        match session {
            Some(id) => self.sessions.resolve(id),
            None => Err(SessionError::NotConnected),
        }
    }
}

/// HTTP and WebSocket front of the dashboard backend
pub struct WebServer {
    state: Arc<AppState>,
    address: SocketAddr,
    allowed_origins: Vec<String>,
}

impl WebServer {
    pub fn new(state: Arc<AppState>, config: &Config) -> Self {
        Self {
            state,
            address: SocketAddr::new(config.bind_address, config.port),
            allowed_origins: config.allowed_origins.clone(),
        }
    }

    /// Serves until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), WebError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (_, serving) = self.bind(shutdown)?;
        serving.await;
        Ok(())
    }

    /// Binds the listener and returns its address with the serving future.
    ///
    /// Once `shutdown` resolves the server stops accepting and open event
    /// streams are ended so the in-flight requests drain. Upgraded terminal
    /// sockets are not waited for. After the drain every live session is
    /// disconnected.
    pub fn bind<F>(
        &self,
        shutdown: F,
    ) -> Result<(SocketAddr, impl Future<Output = ()> + Send + 'static), WebError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let filter = routes(self.state.clone(), &self.allowed_origins);
        let signal = {
            let state = self.state.clone();
            async move {
                shutdown.await;
                state.begin_shutdown();
            }
        };
        let (bound, server) = warp::serve(filter)
            .try_bind_with_graceful_shutdown(self.address, signal)
            .map_err(|e| WebError::BindError(format!("{}: {}", self.address, e)))?;
        info!("Listening on http://{}", bound);

        let state = self.state.clone();
        let serving = async move {
            server.await;
            info!("Web server stopped");
            let closed = state.sessions.shutdown_all();
            info!("Shutdown complete, {} session(s) closed", closed);
        };
        Ok((bound, serving))
    }
}
