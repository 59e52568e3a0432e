use async_trait::async_trait;
use log::{debug, warn};

use super::descriptor::EngineDescriptor;
use crate::error_handling::types::ConnectionError;

/// Liveness check run before a session is committed.
#[async_trait]
pub trait EngineProber: Send + Sync {
    async fn probe(&self, descriptor: &EngineDescriptor) -> Result<(), ConnectionError>;
}

/// Pings the engine's `/_ping` endpoint over a fresh client.
pub struct PingProber;

#[async_trait]
impl EngineProber for PingProber {
    async fn probe(&self, descriptor: &EngineDescriptor) -> Result<(), ConnectionError> {
        let docker = descriptor.open()?;
        match tokio::time::timeout(descriptor.timeout, docker.ping()).await {
            Ok(Ok(_)) => {
                debug!("Engine at {} answered ping", descriptor.endpoint);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Ping to {} failed: {}", descriptor.endpoint, e);
                Err(e.into())
            }
            Err(_) => Err(ConnectionError::Unreachable(format!(
                "No answer from {} within {}s",
                descriptor.endpoint,
                descriptor.timeout.as_secs()
            ))),
        }
    }
}
