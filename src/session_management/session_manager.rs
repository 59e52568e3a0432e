use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use crate::certificate_store::{CertificateMaterial, CertificateStore};
use crate::container_engine::{derive_endpoint, EngineDescriptor, EngineProber};
use crate::error_handling::types::SessionError;
use crate::session_management::session::{Session, SessionId, TransportMode};
use crate::session_management::session_store::SessionStore;

/// What a client supplies to open a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectRequest {
    pub host_address: String,
    pub transport_mode: TransportMode,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

/// A bundle written by `connect` that no stored session owns yet.
struct PendingBundle<'a> {
    certificates: &'a CertificateStore,
    id: &'a SessionId,
}

impl PendingBundle<'_> {
    fn commit(self) {
        std::mem::forget(self);
    }
}

impl Drop for PendingBundle<'_> {
    fn drop(&mut self) {
        debug!("Discarding certificate bundle of unstored session {}", self.id);
        self.certificates.delete(self.id);
    }
}

/// The structure related to session management
///
/// Turns user supplied host and certificate material into stored sessions,
/// and stored sessions back into engine descriptors on demand.
///
/// # Fields Overview
///
/// - `store`: the session state shared by every request
/// - `certificates`: on-disk bundles, one per encrypted session
/// - `prober`: the liveness check a session must pass before it is stored
/// - `engine_port`: port used when the host address carries none
/// - `engine_timeout`: I/O timeout placed in every descriptor
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    certificates: Arc<CertificateStore>,
    prober: Arc<dyn EngineProber>,
    engine_port: u16,
    engine_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        certificates: Arc<CertificateStore>,
        prober: Arc<dyn EngineProber>,
        engine_port: u16,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            store,
            certificates,
            prober,
            engine_port,
            engine_timeout,
        }
    }

    /// All-or-nothing: on any failure no session is stored and no bundle
    /// is left on disk.
    pub async fn connect(&self, request: ConnectRequest) -> Result<Session, SessionError> {
        let host = request.host_address.trim();
        if host.is_empty() {
            return Err(SessionError::Validation("Host IP is required".to_string()));
        }

        let material = match request.transport_mode {
            TransportMode::Encrypted => Some(required_material(&request)?),
            TransportMode::Plain => None,
        };
        let endpoint = derive_endpoint(host, request.transport_mode, self.engine_port)?;

        let id = SessionId::generate();
        let tls = match &material {
            Some(material) => Some(self.certificates.put(&id, material)?),
            None => None,
        };
        // removes the bundle on every early exit, including a dropped future
        let pending = tls.as_ref().map(|_| PendingBundle {
            certificates: &self.certificates,
            id: &id,
        });
        let descriptor = EngineDescriptor {
            endpoint: endpoint.clone(),
            tls,
            timeout: self.engine_timeout,
        };

        if let Err(e) = self.prober.probe(&descriptor).await {
            warn!("Connection to {} failed: {}", endpoint, e);
            return Err(e.into());
        }

        let session = Session {
            id: id.clone(),
            host_address: host.to_string(),
            transport_mode: request.transport_mode,
            connection_endpoint: endpoint,
            credential_ref: material.map(|_| id.clone()),
            created_at: Utc::now(),
        };
        self.store.put(session.clone());
        if let Some(pending) = pending {
            pending.commit();
        }
        info!(
            "Session {} connected to {} ({})",
            session.id, session.connection_endpoint, session.transport_mode
        );
        Ok(session)
    }

    /// Rebuilds the descriptor of a stored session. A session whose bundle
    /// has gone missing is destroyed and reported as `CredentialsMissing`.
    pub fn resolve(&self, id: &SessionId) -> Result<EngineDescriptor, SessionError> {
        let session = self.store.get(id).ok_or(SessionError::NotConnected)?;

        let tls = match session.transport_mode {
            TransportMode::Plain => None,
            TransportMode::Encrypted => {
                let bundle = session
                    .credential_ref
                    .as_ref()
                    .ok_or(SessionError::CredentialsMissing)
                    .and_then(|bundle_id| {
                        self.certificates
                            .get(bundle_id)
                            .map_err(|_| SessionError::CredentialsMissing)
                    });
                match bundle {
                    Ok(paths) => Some(paths),
                    Err(e) => {
                        warn!("Session {} lost its certificate bundle, dropping it", id);
                        self.disconnect(id);
                        return Err(e);
                    }
                }
            }
        };

        debug!("Resolved session {} to {}", id, session.connection_endpoint);
        Ok(EngineDescriptor {
            endpoint: session.connection_endpoint,
            tls,
            timeout: self.engine_timeout,
        })
    }

    /// Always succeeds; bundle removal failures are only logged.
    pub fn disconnect(&self, id: &SessionId) {
        match self.store.delete(id) {
            Some(session) => {
                if let Some(bundle_id) = &session.credential_ref {
                    self.certificates.delete(bundle_id);
                }
                info!("Session {} disconnected", id);
            }
            None => debug!("Disconnect for unknown session {}", id),
        }
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.store.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.store.len()
    }

    /// Disconnects every session; used on shutdown.
    pub fn shutdown_all(&self) -> usize {
        let ids = self.store.ids();
        for id in &ids {
            self.disconnect(id);
        }
        if !ids.is_empty() {
            info!("Disconnected {} session(s) on shutdown", ids.len());
        }
        ids.len()
    }
}

fn required_material(request: &ConnectRequest) -> Result<CertificateMaterial, SessionError> {
    let non_blank = |value: &Option<String>| {
        value
            .as_ref()
            .filter(|v| !v.trim().is_empty())
            .cloned()
    };
    match (
        non_blank(&request.ca_cert),
        non_blank(&request.client_cert),
        non_blank(&request.client_key),
    ) {
        (Some(ca_cert), Some(client_cert), Some(client_key)) => Ok(CertificateMaterial {
            ca_cert,
            client_cert,
            client_key,
        }),
        _ => Err(SessionError::Validation(
            "CA Certificate, Client Certificate, and Client Key are required for HTTPS mode"
                .to_string(),
        )),
    }
}
