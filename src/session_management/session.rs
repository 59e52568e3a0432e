use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque session token: 32 lowercase hex digits of a random v4 UUID.
///
/// Only values produced by [`SessionId::generate`] or accepted by
/// [`SessionId::parse`] exist, so an id is always safe to use as a
/// directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().simple().to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 32 && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Some(SessionId(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport towards the remote engine. The wire names are the URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransportMode {
    #[serde(rename = "http")]
    Plain,
    #[default]
    #[serde(rename = "https")]
    Encrypted,
}

impl TransportMode {
    pub fn scheme(&self) -> &'static str {
        match self {
            TransportMode::Plain => "http",
            TransportMode::Encrypted => "https",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// One authenticated connection context, as kept in the session store.
///
/// Holds no live remote handle; consumers rebuild an engine descriptor
/// from it on every use.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub host_address: String,
    pub transport_mode: TransportMode,
    pub connection_endpoint: String,
    /// Certificate bundle id, always the session id itself in encrypted mode.
    pub credential_ref: Option<SessionId>,
    pub created_at: DateTime<Utc>,
}
