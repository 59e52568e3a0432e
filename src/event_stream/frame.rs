use serde_json::{json, Value};
use std::fmt;

/// One record of an outbound event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Data(Value),
    Error(String),
    Complete,
}

impl StreamFrame {
    /// `data: <json>\n\n`. Serialized JSON never contains a raw newline, so
    /// the blank line is an unambiguous record delimiter.
    pub fn encode(&self) -> String {
        let payload = match self {
            StreamFrame::Data(value) => value.to_string(),
            StreamFrame::Error(message) => json!({ "error": message }).to_string(),
            StreamFrame::Complete => json!({ "status": "completed" }).to_string(),
        };
        format!("data: {}\n\n", payload)
    }
}

/// What a stream observes; decides the error frame wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Logs,
    Pull,
    Usage,
}

impl StreamKind {
    /// Only finite sources announce their end. Follow streams simply stop.
    pub fn announces_completion(&self) -> bool {
        matches!(self, StreamKind::Pull)
    }

    pub fn error_context(&self) -> &'static str {
        match self {
            StreamKind::Logs => "Log stream error",
            StreamKind::Pull => "Pull failed",
            StreamKind::Usage => "Stream failed",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Logs => write!(f, "logs"),
            StreamKind::Pull => write!(f, "pull"),
            StreamKind::Usage => write!(f, "usage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_use_one_delimiter() {
        assert_eq!(
            StreamFrame::Data(json!({ "line": "starting" })).encode(),
            "data: {\"line\":\"starting\"}\n\n"
        );
        assert_eq!(StreamFrame::Complete.encode(), "data: {\"status\":\"completed\"}\n\n");
        assert_eq!(
            StreamFrame::Error("Container not found".into()).encode(),
            "data: {\"error\":\"Container not found\"}\n\n"
        );
    }

    #[test]
    fn test_multiline_payload_stays_one_record() {
        let encoded = StreamFrame::Data(json!({ "line": "a\nb" })).encode();
        assert_eq!(encoded.matches("\n\n").count(), 1);
        assert!(encoded.ends_with("\n\n"));
    }
}
