use std::future::Future;
use std::sync::Arc;

use futures::future;
use log::{error, info};

use crate::certificate_store::CertificateStore;
use crate::configuration::config::Config;
use crate::container_engine::PingProber;
use crate::error_handling::types::*;
use crate::session_management::{MemorySessionStore, SessionManager};
use crate::web_interface::{AppState, WebServer};

/// Wires the components together and owns the process lifecycle.
pub struct Controller {
    pub config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs until Ctrl-C. Leftover bundles from an earlier process are
    /// purged first; the web server disconnects every live session on the
    /// way out.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        let certificates = Arc::new(
            CertificateStore::new(&self.config.certs_dir)
                .map_err(ControllerError::CertificateError)?,
        );
        let purged = certificates.purge_stale();
        if purged > 0 {
            info!("Removed {} stale certificate bundle(s)", purged);
        }

        let sessions = Arc::new(SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            certificates,
            Arc::new(PingProber),
            self.config.engine_port,
            self.config.engine_timeout,
        ));
        let state = Arc::new(AppState::new(sessions, &self.config));
        let server = WebServer::new(state, &self.config);

        server
            .start(shutdown_signal())
            .await
            .map_err(ControllerError::WebError)
    }
}

async fn shutdown_signal() {
    until_signalled(tokio::signal::ctrl_c()).await
}

/// A signal that cannot be registered never fires, the server keeps running.
async fn until_signalled<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            error!("Unable to listen for shutdown signal: {}", e);
            future::pending::<()>().await;
        }
    }
}
