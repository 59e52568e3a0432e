use std::future::Future;

use futures::{Stream, StreamExt};
use log::{debug, info, warn};

use super::frame::{StreamFrame, StreamKind};
use crate::container_engine::OpenedSource;
use crate::error_handling::types::StreamError;

/// Keeps the remote handle alive for exactly as long as the stream runs.
struct SourceLease<H> {
    kind: StreamKind,
    _handle: H,
}

impl<H> Drop for SourceLease<H> {
    fn drop(&mut self) {
        info!("{} stream closed, remote handle released", self.kind);
    }
}

/// Turns a remote event source into a lazy sequence of frames.
///
/// `connect` runs on first poll. Every item of the source becomes one
/// `Data` frame in source order; malformed items are skipped; the first
/// other error becomes a single `Error` frame and ends the sequence;
/// exhaustion of a pull ends it with `Complete`. Nothing is buffered: a frame is
/// produced only when the consumer asks for the next one. Dropping the
/// sequence early releases the handle just the same.
pub fn open<H, F>(kind: StreamKind, connect: F) -> impl Stream<Item = StreamFrame> + Send
where
    H: Send + 'static,
    F: Future<Output = Result<OpenedSource<H>, StreamError>> + Send + 'static,
{
    async_stream::stream! {
        let OpenedSource { handle, mut events } = match connect.await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Could not open {} stream: {}", kind, e);
                yield StreamFrame::Error(e.client_message(kind.error_context()));
                return;
            }
        };
        let _lease = SourceLease { kind, _handle: handle };
        info!("{} stream opened", kind);

        while let Some(item) = events.next().await {
            match item {
                Ok(payload) => {
                    debug!("{} stream event", kind);
                    yield StreamFrame::Data(payload);
                }
                Err(e) if e.is_transient() => {
                    warn!("Skipping undecodable {} event: {}", kind, e);
                }
                Err(e) => {
                    warn!("{} stream failed: {}", kind, e);
                    yield StreamFrame::Error(e.client_message(kind.error_context()));
                    return;
                }
            }
        }
        debug!("{} source ended", kind);
        if kind.announces_completion() {
            yield StreamFrame::Complete;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::stream;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_eq};

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn source(
        items: Vec<Result<Value, StreamError>>,
        released: &Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<OpenedSource<DropCounter>, StreamError>> + Send + 'static {
        let handle = DropCounter(released.clone());
        async move {
            Ok(OpenedSource {
                handle,
                events: Box::pin(stream::iter(items)),
            })
        }
    }

    fn lines(n: usize) -> Vec<Result<Value, StreamError>> {
        (0..n).map(|i| Ok(json!({ "line": format!("line {}", i) }))).collect()
    }

    #[tokio::test]
    async fn test_finite_source_ends_with_complete() {
        let released = Arc::new(AtomicUsize::new(0));
        let frames: Vec<_> = open(StreamKind::Pull, source(lines(3), &released))
            .collect()
            .await;

        assert_eq!(frames.len(), 4);
        for (i, frame) in frames[..3].iter().enumerate() {
            assert_eq!(frame, &StreamFrame::Data(json!({ "line": format!("line {}", i) })));
        }
        assert_eq!(frames[3], StreamFrame::Complete);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_ends_the_stream_after_one_frame() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut items = lines(2);
        items.push(Err(StreamError::Remote("connection reset".into())));
        items.extend(lines(5));

        let frames: Vec<_> = open(StreamKind::Logs, source(items, &released))
            .collect()
            .await;

        assert_eq!(frames.len(), 3);
        assert!(frames[..2].iter().all(|f| matches!(f, StreamFrame::Data(_))));
        assert_eq!(
            frames[2],
            StreamFrame::Error("Log stream error: connection reset".into())
        );
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped() {
        let released = Arc::new(AtomicUsize::new(0));
        let items = vec![
            Ok(json!(1)),
            Err(StreamError::Malformed("truncated".into())),
            Ok(json!(2)),
        ];

        let frames: Vec<_> = open(StreamKind::Usage, source(items, &released))
            .collect()
            .await;

        assert_eq!(
            frames,
            vec![
                StreamFrame::Data(json!(1)),
                StreamFrame::Data(json!(2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_a_single_error_frame() {
        let connect = async {
            Err::<OpenedSource<()>, _>(StreamError::NotFound("Container".into()))
        };
        let frames: Vec<_> = open(StreamKind::Usage, connect).collect().await;
        assert_eq!(frames, vec![StreamFrame::Error("Container not found".into())]);
    }

    #[tokio::test]
    async fn test_dropping_early_releases_handle_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let handle = DropCounter(released.clone());
        let connect = async move {
            Ok(OpenedSource {
                handle,
                events: Box::pin(stream::iter(lines(1)).chain(stream::pending())),
            })
        };

        let mut frames = Box::pin(open(StreamKind::Logs, connect));
        assert!(matches!(frames.next().await, Some(StreamFrame::Data(_))));
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(frames);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_frame_before_the_source_yields() {
        let (tx, rx) = mpsc::unbounded::<Value>();
        let connect = async move {
            Ok(OpenedSource {
                handle: (),
                events: Box::pin(rx.map(Ok)),
            })
        };
        let mut task = tokio_test::task::spawn(open(StreamKind::Logs, connect));

        assert_pending!(task.poll_next());
        tx.unbounded_send(json!({ "line": "first" })).unwrap();
        assert_ready_eq!(
            task.poll_next(),
            Some(StreamFrame::Data(json!({ "line": "first" })))
        );
        assert_pending!(task.poll_next());

        drop(tx);
        assert_ready_eq!(task.poll_next(), None);
    }

    #[tokio::test]
    async fn test_ended_follow_source_is_not_announced_as_complete() {
        let released = Arc::new(AtomicUsize::new(0));
        let frames: Vec<_> = open(StreamKind::Logs, source(lines(2), &released))
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| matches!(f, StreamFrame::Data(_))));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
