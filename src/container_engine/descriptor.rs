use std::time::Duration;

use bollard::{Docker, API_DEFAULT_VERSION};
use log::debug;

use crate::certificate_store::types::BundlePaths;
use crate::error_handling::types::ConnectionError;
use crate::session_management::session::TransportMode;

/// Everything needed to open a connection to one remote engine.
///
/// Cheap to clone and holds no socket: every consumer calls [`open`] and
/// gets its own client, so concurrent streams never share a connection.
///
/// [`open`]: EngineDescriptor::open
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDescriptor {
    pub endpoint: String,
    pub tls: Option<BundlePaths>,
    pub timeout: Duration,
}

impl EngineDescriptor {
    pub fn open(&self) -> Result<Docker, ConnectionError> {
        let timeout_secs = self.timeout.as_secs().max(1);
        debug!("Opening engine client for {}", self.endpoint);
        let docker = match &self.tls {
            Some(bundle) => Docker::connect_with_ssl(
                &self.endpoint,
                &bundle.key,
                &bundle.cert,
                &bundle.ca,
                timeout_secs,
                API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_http(&self.endpoint, timeout_secs, API_DEFAULT_VERSION),
        };
        docker.map_err(ConnectionError::from)
    }
}

/// Builds `<scheme>://<host>:<port>` from what the user typed.
///
/// Accepts a bare host, `host:port`, a bare or bracketed IPv6 address, and
/// any of those behind an `http://`, `https://` or `tcp://` prefix. The
/// scheme always follows `mode`; an explicit port wins over `default_port`.
pub fn derive_endpoint(
    host: &str,
    mode: TransportMode,
    default_port: u16,
) -> Result<String, ConnectionError> {
    let mut rest = host.trim();
    for prefix in ["https://", "http://", "tcp://"] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    let rest = rest.trim_end_matches('/');

    if rest.is_empty() {
        return Err(ConnectionError::InvalidEndpoint(
            "Host IP is required".to_string(),
        ));
    }
    if rest
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '@' | '?' | '#'))
    {
        return Err(ConnectionError::InvalidEndpoint(format!(
            "'{}' is not a host address",
            host.trim()
        )));
    }

    let authority = if rest.starts_with('[') {
        match rest.find(']') {
            Some(end) if end + 1 == rest.len() => format!("{}:{}", rest, default_port),
            Some(end) if rest[end + 1..].starts_with(':') => rest.to_string(),
            _ => {
                return Err(ConnectionError::InvalidEndpoint(format!(
                    "'{}' is not a host address",
                    rest
                )))
            }
        }
    } else {
        match rest.matches(':').count() {
            0 => format!("{}:{}", rest, default_port),
            1 => rest.to_string(),
            _ => format!("[{}]:{}", rest, default_port),
        }
    };

    Ok(format!("{}://{}", mode.scheme(), authority))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_gets_scheme_and_port() {
        assert_eq!(
            derive_endpoint("10.0.0.5", TransportMode::Encrypted, 2376).unwrap(),
            "https://10.0.0.5:2376"
        );
        assert_eq!(
            derive_endpoint(" docker.local ", TransportMode::Plain, 2375).unwrap(),
            "http://docker.local:2375"
        );
    }

    #[test]
    fn test_existing_scheme_and_port_are_normalised() {
        assert_eq!(
            derive_endpoint("tcp://10.0.0.5:2380/", TransportMode::Encrypted, 2376).unwrap(),
            "https://10.0.0.5:2380"
        );
        assert_eq!(
            derive_endpoint("https://10.0.0.5", TransportMode::Encrypted, 2376).unwrap(),
            "https://10.0.0.5:2376"
        );
    }

    #[test]
    fn test_ipv6_is_bracketed() {
        assert_eq!(
            derive_endpoint("fd00::5", TransportMode::Encrypted, 2376).unwrap(),
            "https://[fd00::5]:2376"
        );
        assert_eq!(
            derive_endpoint("[fd00::5]:2380", TransportMode::Encrypted, 2376).unwrap(),
            "https://[fd00::5]:2380"
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        for host in ["", "   ", "https://", "10.0.0.5/v1.41", "user@10.0.0.5", "[fd00::5"] {
            assert!(
                matches!(
                    derive_endpoint(host, TransportMode::Encrypted, 2376),
                    Err(ConnectionError::InvalidEndpoint(_))
                ),
                "{:?}",
                host
            );
        }
    }

    #[tokio::test]
    async fn test_plain_descriptor_opens_without_io() {
        let descriptor = EngineDescriptor {
            endpoint: "http://127.0.0.1:2375".to_string(),
            tls: None,
            timeout: Duration::from_secs(10),
        };
        assert!(descriptor.open().is_ok());
    }
}
