use std::fmt;

/// Coarse classification shared by every error that can reach a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Credential,
    Connectivity,
    Authentication,
    RemoteRuntime,
    StreamTransient,
    Resource,
}

impl ErrorKind {
    /// HTTP status used when the error ends a request/response call.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Resource => 400,
            ErrorKind::Credential => 401,
            ErrorKind::Authentication => 401,
            ErrorKind::Connectivity => 502,
            ErrorKind::RemoteRuntime => 500,
            ErrorKind::StreamTransient => 500,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
    DirectoryUnavailable(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
            ConfigError::DirectoryUnavailable(e) => write!(f, "Directory error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CertificateError {
    WriteFailed(String),
    NotFound(String),
    IncompleteBundle {
        session_id: String,
        missing: Vec<&'static str>,
    },
}

impl CertificateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertificateError::WriteFailed(_) => ErrorKind::Resource,
            CertificateError::NotFound(_) | CertificateError::IncompleteBundle { .. } => {
                ErrorKind::Credential
            }
        }
    }
}

impl fmt::Display for CertificateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateError::WriteFailed(e) => write!(f, "Certificate write failed: {}", e),
            CertificateError::NotFound(id) => {
                write!(f, "No certificate bundle for session {}", id)
            }
            CertificateError::IncompleteBundle {
                session_id,
                missing,
            } => write!(
                f,
                "Incomplete certificate bundle for session {} (missing {})",
                session_id,
                missing.join(", ")
            ),
        }
    }
}

impl std::error::Error for CertificateError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionError {
    InvalidEndpoint(String),
    Unreachable(String),
    Authentication(String),
}

impl ConnectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectionError::InvalidEndpoint(_) => ErrorKind::Validation,
            ConnectionError::Unreachable(_) => ErrorKind::Connectivity,
            ConnectionError::Authentication(_) => ErrorKind::Authentication,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidEndpoint(e) => write!(f, "Invalid engine endpoint: {}", e),
            ConnectionError::Unreachable(e) => write!(f, "{}", e),
            ConnectionError::Authentication(e) => write!(f, "Authentication rejected: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<bollard::errors::Error> for ConnectionError {
    fn from(err: bollard::errors::Error) -> Self {
        if let bollard::errors::Error::DockerResponseServerError {
            status_code: 401 | 403,
            message,
        } = &err
        {
            return ConnectionError::Authentication(message.clone());
        }
        let text = err.to_string();
        let lower = text.to_lowercase();
        if ["certificate", "tls", "ssl", "handshake"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            ConnectionError::Authentication(text)
        } else {
            ConnectionError::Unreachable(text)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Validation(String),
    Certificate(CertificateError),
    Connection(ConnectionError),
    NotConnected,
    CredentialsMissing,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Validation(_) => ErrorKind::Validation,
            SessionError::Certificate(e) => e.kind(),
            SessionError::Connection(e) => e.kind(),
            SessionError::NotConnected => ErrorKind::Credential,
            SessionError::CredentialsMissing => ErrorKind::Credential,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(e) => write!(f, "{}", e),
            SessionError::Certificate(e) => write!(f, "Failed to configure TLS: {}", e),
            SessionError::Connection(e) => write!(f, "Connection failed: {}", e),
            SessionError::NotConnected => {
                write!(f, "Not connected to any Docker host. Please connect first.")
            }
            SessionError::CredentialsMissing => write!(
                f,
                "Certificate files not found for this session. Please reconnect."
            ),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CertificateError> for SessionError {
    fn from(err: CertificateError) -> Self {
        SessionError::Certificate(err)
    }
}

impl From<ConnectionError> for SessionError {
    fn from(err: ConnectionError) -> Self {
        SessionError::Connection(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    Connection(ConnectionError),
    NotFound(String),
    Remote(String),
    Malformed(String),
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Connection(e) => e.kind(),
            StreamError::NotFound(_) | StreamError::Remote(_) => ErrorKind::RemoteRuntime,
            StreamError::Malformed(_) => ErrorKind::StreamTransient,
        }
    }

    /// A single undecodable event; the stream carries on past it.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::StreamTransient
    }

    /// Message placed in the error frame, prefixed with what was being streamed.
    pub fn client_message(&self, context: &str) -> String {
        match self {
            StreamError::NotFound(what) => format!("{} not found", what),
            other => format!("{}: {}", context, other),
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connection(e) => write!(f, "{}", e),
            StreamError::NotFound(what) => write!(f, "{} not found", what),
            StreamError::Remote(e) => write!(f, "{}", e),
            StreamError::Malformed(e) => write!(f, "Malformed event: {}", e),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<ConnectionError> for StreamError {
    fn from(err: ConnectionError) -> Self {
        StreamError::Connection(err)
    }
}

/// Why a terminal never got past its first message. Closed with 1008.
#[derive(Debug, Clone, PartialEq)]
pub enum InitiationError {
    Timeout,
    Malformed(String),
    MissingContainerId,
    Invalid(String),
}

impl InitiationError {
    /// Error frame sent before closing, when the client deserves one.
    pub fn client_error(&self) -> Option<String> {
        match self {
            InitiationError::Timeout | InitiationError::Malformed(_) => None,
            InitiationError::MissingContainerId => Some("Container ID is required.".to_string()),
            InitiationError::Invalid(e) => Some(e.clone()),
        }
    }

    pub fn close_reason(&self) -> &'static str {
        match self {
            InitiationError::Timeout => "Initial parameters not received.",
            InitiationError::Malformed(_) => "Invalid initial parameters.",
            InitiationError::MissingContainerId => "Container ID not provided.",
            InitiationError::Invalid(_) => "Invalid initial parameters.",
        }
    }
}

impl fmt::Display for InitiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitiationError::Timeout => write!(f, "Initial parameters not received."),
            InitiationError::Malformed(e) => write!(f, "Malformed initial parameters: {}", e),
            InitiationError::MissingContainerId => write!(f, "Container ID is required."),
            InitiationError::Invalid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InitiationError {}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminalError {
    NotConnected(String),
    Connection(String),
    Authentication(String),
    Remote(String),
    Client(String),
}

impl TerminalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TerminalError::NotConnected(_) => ErrorKind::Credential,
            TerminalError::Connection(_) => ErrorKind::Connectivity,
            TerminalError::Authentication(_) => ErrorKind::Authentication,
            TerminalError::Remote(_) => ErrorKind::RemoteRuntime,
            TerminalError::Client(_) => ErrorKind::Connectivity,
        }
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalError::NotConnected(e) => write!(f, "{}", e),
            TerminalError::Connection(e) => write!(f, "Connection failed: {}", e),
            TerminalError::Authentication(e) => write!(f, "Authentication failed: {}", e),
            TerminalError::Remote(e) => write!(f, "{}", e),
            TerminalError::Client(e) => write!(f, "Client socket error: {}", e),
        }
    }
}

impl std::error::Error for TerminalError {}

impl From<ConnectionError> for TerminalError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Authentication(e) => TerminalError::Authentication(e),
            other => TerminalError::Connection(other.to_string()),
        }
    }
}

impl From<SessionError> for TerminalError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Connection(e) => e.into(),
            other => TerminalError::NotConnected(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    BindError(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindError(e) => write!(f, "Web server bind error: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    CertificateError(CertificateError),
    WebError(WebError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::CertificateError(e) => write!(f, "Certificate store error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web server error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_distinct_statuses() {
        let missing = SessionError::CredentialsMissing;
        let unreachable =
            SessionError::Connection(ConnectionError::Unreachable("no route".to_string()));
        let rejected =
            SessionError::Connection(ConnectionError::Authentication("bad cert".to_string()));

        assert_eq!(missing.kind(), ErrorKind::Credential);
        assert_eq!(unreachable.kind().status_code(), 502);
        assert_eq!(rejected.kind(), ErrorKind::Authentication);
        assert_ne!(unreachable.kind(), rejected.kind());
    }

    #[test]
    fn stream_error_client_message_uses_context() {
        let remote = StreamError::Remote("socket hang up".to_string());
        assert_eq!(
            remote.client_message("Log stream error"),
            "Log stream error: socket hang up"
        );

        let missing = StreamError::NotFound("Container".to_string());
        assert_eq!(missing.client_message("Stream failed"), "Container not found");

        assert!(StreamError::Malformed("bad json".to_string()).is_transient());
        assert!(!remote.is_transient());
    }

    #[test]
    fn engine_rejection_is_authentication_not_connectivity() {
        let rejected: ConnectionError = bollard::errors::Error::DockerResponseServerError {
            status_code: 403,
            message: "client certificate required".to_string(),
        }
        .into();
        assert_eq!(rejected.kind(), ErrorKind::Authentication);

        let failed: ConnectionError = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "daemon is shutting down".to_string(),
        }
        .into();
        assert_eq!(failed.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn missing_container_id_gets_an_error_frame_but_timeout_does_not() {
        let missing = InitiationError::MissingContainerId;
        assert_eq!(missing.client_error().as_deref(), Some("Container ID is required."));
        assert_eq!(missing.close_reason(), "Container ID not provided.");
        assert_eq!(InitiationError::Timeout.client_error(), None);
        assert_eq!(
            InitiationError::Timeout.close_reason(),
            "Initial parameters not received."
        );
    }

    #[test]
    fn authentication_survives_conversion_to_terminal_error() {
        let err: TerminalError = ConnectionError::Authentication("denied".to_string()).into();
        assert_eq!(err, TerminalError::Authentication("denied".to_string()));
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }
}
