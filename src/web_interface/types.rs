use serde::{Deserialize, Serialize};

/// Error body of every failed request/response call.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// POST /api/connect body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBody {
    pub host_ip: Option<String>,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    /// `https` (default) or `http`.
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub host: String,
    pub mode: String,
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub container: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    pub repository: Option<String>,
    pub tag: Option<String>,
}
