//! Messages exchanged with the browser terminal.
//!
//! Client to server: one initiation object, then either resize directives
//! (`{"type":"resize","cols":..,"rows":..}`) or raw terminal input.
//! Server to client: `{"output": ..}` or `{"error": ..}`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error_handling::types::InitiationError;

pub const DEFAULT_COMMAND: &str = "/bin/sh";
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl TerminalSize {
    /// Out of range values are clamped to `1..=u16::MAX`.
    fn clamped(cols: i64, rows: i64) -> Self {
        let clamp = |v: i64| v.clamp(1, u16::MAX as i64) as u16;
        Self {
            cols: clamp(cols),
            rows: clamp(rows),
        }
    }
}

/// A validated initiation message.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalRequest {
    pub container_id: String,
    pub command: String,
    pub size: TerminalSize,
    /// Per-connection host override, only honoured by the SSH backend.
    pub host_ip: Option<String>,
}

impl TerminalRequest {
    pub fn argv(&self) -> Vec<String> {
        self.command.split_whitespace().map(str::to_string).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiationMessage {
    container_id: Option<String>,
    command: Option<String>,
    cols: Option<i64>,
    rows: Option<i64>,
    host_ip: Option<String>,
}

static CONTAINER_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").expect("valid regex"));

static COMMAND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_./ =:,@+-]{1,256}$").expect("valid regex"));

static HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.:\[\]-]{1,253}$").expect("valid regex"));

/// Parses and validates the first client message.
///
/// Every value that ends up in a remote command line is checked against a
/// strict character set here.
pub fn parse_initiation(text: &str) -> Result<TerminalRequest, InitiationError> {
    if text.trim().is_empty() {
        return Err(InitiationError::Timeout);
    }
    let message: InitiationMessage =
        serde_json::from_str(text).map_err(|e| InitiationError::Malformed(e.to_string()))?;

    let container_id = message
        .container_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(InitiationError::MissingContainerId)?;
    if !CONTAINER_ID_REGEX.is_match(&container_id) {
        return Err(InitiationError::Invalid(format!(
            "Invalid container ID: {}",
            container_id
        )));
    }

    let command = message
        .command
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_COMMAND.to_string());
    if !COMMAND_REGEX.is_match(&command) {
        return Err(InitiationError::Invalid("Invalid shell command.".to_string()));
    }

    let host_ip = message
        .host_ip
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());
    if let Some(host) = &host_ip {
        if !HOST_REGEX.is_match(host) {
            return Err(InitiationError::Invalid(format!("Invalid host: {}", host)));
        }
    }

    Ok(TerminalRequest {
        container_id,
        command,
        size: TerminalSize::clamped(
            message.cols.unwrap_or(DEFAULT_COLS as i64),
            message.rows.unwrap_or(DEFAULT_ROWS as i64),
        ),
        host_ip,
    })
}

/// What a text message from the client means once proxying has started.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientInput {
    Resize(TerminalSize),
    Input(Vec<u8>),
}

/// A resize needs `type == "resize"` and integer `cols`/`rows`; anything
/// else is keystrokes.
pub fn classify(text: &str) -> ClientInput {
    if text.trim_start().starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            let is_resize = map.get("type").and_then(Value::as_str) == Some("resize");
            let cols = map.get("cols").and_then(Value::as_i64);
            let rows = map.get("rows").and_then(Value::as_i64);
            if let (true, Some(cols), Some(rows)) = (is_resize, cols, rows) {
                return ClientInput::Resize(TerminalSize::clamped(cols, rows));
            }
        }
    }
    ClientInput::Input(text.as_bytes().to_vec())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerFrame {
    Output(String),
    Error(String),
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"encoding failed"}"#.into())
    }
}

/// Lossy UTF-8 decoding that holds back an incomplete trailing sequence
/// until the next read completes it.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Whatever is still held back, replaced lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiation_defaults() {
        let request = parse_initiation(r#"{"containerId":"web-1"}"#).unwrap();
        assert_eq!(request.container_id, "web-1");
        assert_eq!(request.command, "/bin/sh");
        assert_eq!(request.size, TerminalSize { cols: 80, rows: 24 });
        assert_eq!(request.host_ip, None);
    }

    #[test]
    fn test_initiation_with_everything() {
        let request = parse_initiation(
            r#"{"containerId":"3f2a9c","command":"/bin/bash -l","cols":132,"rows":43,"hostIp":"10.0.0.5"}"#,
        )
        .unwrap();
        assert_eq!(request.argv(), vec!["/bin/bash", "-l"]);
        assert_eq!(request.size, TerminalSize { cols: 132, rows: 43 });
        assert_eq!(request.host_ip.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_initiation_failures() {
        assert_eq!(
            parse_initiation(r#"{"command":"/bin/bash"}"#),
            Err(InitiationError::MissingContainerId)
        );
        assert_eq!(
            parse_initiation(r#"{"containerId":"  "}"#),
            Err(InitiationError::MissingContainerId)
        );
        assert!(matches!(
            parse_initiation("not json"),
            Err(InitiationError::Malformed(_))
        ));
        assert!(matches!(
            parse_initiation(r#"{"containerId":"web; rm -rf /"}"#),
            Err(InitiationError::Invalid(_))
        ));
        assert!(matches!(
            parse_initiation(r#"{"containerId":"web","command":"sh -c $(id)"}"#),
            Err(InitiationError::Invalid(_))
        ));
        assert!(matches!(
            parse_initiation(r#"{"containerId":"web","hostIp":"a b"}"#),
            Err(InitiationError::Invalid(_))
        ));
        assert_eq!(parse_initiation(""), Err(InitiationError::Timeout));
    }

    #[test]
    fn test_resize_is_recognised() {
        assert_eq!(
            classify(r#"{"type":"resize","cols":120,"rows":40}"#),
            ClientInput::Resize(TerminalSize { cols: 120, rows: 40 })
        );
        assert_eq!(
            classify(r#"{"type":"resize","cols":0,"rows":-3}"#),
            ClientInput::Resize(TerminalSize { cols: 1, rows: 1 })
        );
    }

    #[test]
    fn test_resize_with_surrounding_whitespace() {
        assert_eq!(
            classify(" \n{\"type\":\"resize\",\"cols\":100,\"rows\":30}\n"),
            ClientInput::Resize(TerminalSize { cols: 100, rows: 30 })
        );
    }

    #[test]
    fn test_everything_else_is_input() {
        for text in [
            "ls -la\r",
            r#"{"type":"resize","cols":"wide","rows":40}"#,
            r#"{"type":"resize"}"#,
            r#"{"cols":120,"rows":40}"#,
            "{",
        ] {
            assert_eq!(classify(text), ClientInput::Input(text.as_bytes().to_vec()));
        }
    }

    #[test]
    fn test_server_frames() {
        assert_eq!(ServerFrame::Output("hi\r\n".into()).to_json(), r#"{"output":"hi\r\n"}"#);
        assert_eq!(ServerFrame::Error("boom".into()).to_json(), r#"{"error":"boom"}"#);
    }

    #[test]
    fn test_split_multibyte_character() {
        let mut carry = Utf8Carry::default();
        let euro = "€".as_bytes();
        assert_eq!(carry.decode(&euro[..2]), "");
        assert_eq!(carry.decode(&euro[2..]), "€");
        assert_eq!(carry.decode(b"ok\xffok"), "ok\u{fffd}ok");
        assert_eq!(carry.decode(&euro[..1]), "");
        assert_eq!(carry.finish(), "\u{fffd}");
    }
}
