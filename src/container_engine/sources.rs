use std::pin::Pin;

use bollard::container::{LogOutput, LogsOptions, StatsOptions};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::{stream, Stream, StreamExt};
use log::debug;
use serde_json::{json, Value};

use super::descriptor::EngineDescriptor;
use crate::error_handling::types::{ConnectionError, StreamError};
use crate::usage_metrics::sample_to_payload;

pub type EventSource = Pin<Box<dyn Stream<Item = Result<Value, StreamError>> + Send>>;

/// A remote event source together with the client it reads through.
///
/// The handle is owned by whoever consumes `events` and dropped with it.
pub struct OpenedSource<H> {
    pub handle: H,
    pub events: EventSource,
}

/// Follows stdout and stderr of a container, starting `tail` lines back.
/// Each non-blank line becomes `{"line": ...}`.
pub async fn open_logs(
    descriptor: EngineDescriptor,
    container: String,
    tail: u32,
) -> Result<OpenedSource<Docker>, StreamError> {
    let docker = descriptor.open()?;
    docker
        .inspect_container(&container, None)
        .await
        .map_err(|e| classify(e, Some("Container")))?;

    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        tail: tail.to_string(),
        ..Default::default()
    };
    debug!("Following logs of {} from {}", container, descriptor.endpoint);

    let events = docker
        .logs(&container, Some(options))
        .flat_map(|item| {
            let frames: Vec<Result<Value, StreamError>> = match item {
                Ok(output) => log_lines(&output)
                    .into_iter()
                    .map(|line| Ok(json!({ "line": line })))
                    .collect(),
                Err(e) => vec![Err(classify(e, Some("Container")))],
            };
            stream::iter(frames)
        });

    Ok(OpenedSource {
        handle: docker,
        events: Box::pin(events),
    })
}

/// Pulls `repository:tag`, forwarding every progress record as-is.
/// The engine is pinged first so an unreachable host fails before the pull.
pub async fn open_pull(
    descriptor: EngineDescriptor,
    repository: String,
    tag: String,
) -> Result<OpenedSource<Docker>, StreamError> {
    let docker = descriptor.open()?;
    docker
        .ping()
        .await
        .map_err(|e| StreamError::Connection(ConnectionError::from(e)))?;

    debug!("Pulling {}:{} on {}", repository, tag, descriptor.endpoint);
    let options = CreateImageOptions {
        from_image: repository,
        tag,
        ..Default::default()
    };
    let events = docker
        .create_image(Some(options), None, None)
        .map(|item| match item {
            Ok(info) => {
                serde_json::to_value(info).map_err(|e| StreamError::Malformed(e.to_string()))
            }
            Err(e) => Err(classify(e, None)),
        });

    Ok(OpenedSource {
        handle: docker,
        events: Box::pin(events),
    })
}

/// Streams resource usage of a container, one payload per engine sample.
pub async fn open_usage(
    descriptor: EngineDescriptor,
    container: String,
) -> Result<OpenedSource<Docker>, StreamError> {
    let docker = descriptor.open()?;
    docker
        .inspect_container(&container, None)
        .await
        .map_err(|e| classify(e, Some("Container")))?;

    debug!("Sampling usage of {} on {}", container, descriptor.endpoint);
    let options = StatsOptions {
        stream: true,
        one_shot: false,
    };
    let events = docker
        .stats(&container, Some(options))
        .map(|item| match item {
            Ok(stats) => serde_json::to_value(stats)
                .map_err(|e| StreamError::Malformed(e.to_string()))
                .and_then(sample_to_payload),
            Err(e) => Err(classify(e, Some("Container"))),
        });

    Ok(OpenedSource {
        handle: docker,
        events: Box::pin(events),
    })
}

/// Raw bytes of one engine output chunk, whichever stream it came from.
pub(crate) fn output_bytes(output: &LogOutput) -> &[u8] {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => &message[..],
    }
}

fn log_lines(output: &LogOutput) -> Vec<String> {
    String::from_utf8_lossy(output_bytes(output))
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// A 404 names `subject` when there is one; everything else is a remote failure.
fn classify(err: bollard::errors::Error, subject: Option<&str>) -> StreamError {
    let status = match &err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    };
    match (status, subject) {
        (Some(404), Some(subject)) => StreamError::NotFound(subject.to_string()),
        (Some(401 | 403), _) => StreamError::Connection(ConnectionError::from(err)),
        _ => StreamError::Remote(err.to_string()),
    }
}
