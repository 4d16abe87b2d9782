//! Drives one analysis stream from raw body chunks to published snapshots.

use crate::aggregator::{Aggregator, LineOutcome, StreamStats};
use crate::error::StreamError;
use crate::record::ResultSet;
use feed_frames::LineStream;
use futures_util::future::{self, BoxFuture};
use futures_util::{pin_mut, FutureExt, Stream, StreamExt};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Shared flag that stops a stream between chunk reads.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    /// Creates a handle that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation and wakes the reader.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Cancels after `timeout` unless the returned task is aborted first.
    pub fn cancel_after(&self, timeout: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            sleep(timeout).await;
            if !handle.is_cancelled() {
                debug!(?timeout, "stream deadline reached");
                handle.cancel();
            }
        })
    }
}

/// Receives the incremental output of a stream.
///
/// After `on_complete` or `on_failure`, or after cancellation, no method is called
/// again.
pub trait StreamObserver {
    /// A new snapshot was published.
    fn on_snapshot(&mut self, snapshot: &ResultSet);
    /// The feed ended cleanly.
    fn on_complete(&mut self);
    /// The stream failed; earlier snapshots stay valid.
    fn on_failure(&mut self, error: &StreamError);
    /// Whether the consumer went away. A closed observer stops the stream.
    fn is_closed(&self) -> bool {
        false
    }
    /// Resolves when the consumer goes away; never resolves by default.
    fn closed(&self) -> BoxFuture<'_, ()> {
        future::pending().boxed()
    }
}

/// Coarse classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credentials rejected; reset the session.
    Unauthorized,
    /// Non-success status other than 401.
    Status(StatusCode),
    /// Network or body read failure.
    Transport,
    /// Malformed payload under the abort policy.
    Payload,
}

impl From<&StreamError> for FailureKind {
    fn from(err: &StreamError) -> Self {
        match err {
            StreamError::Unauthorized => FailureKind::Unauthorized,
            StreamError::Status(status) => FailureKind::Status(*status),
            StreamError::Transport(_) | StreamError::Body(_) => FailureKind::Transport,
            StreamError::Payload(_) => FailureKind::Payload,
        }
    }
}

/// Event form of [`StreamObserver`] for channel consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Latest full snapshot.
    Snapshot(ResultSet),
    /// Clean end of feed.
    Completed,
    /// Terminal failure.
    Failed {
        /// Classification for the caller's reaction.
        kind: FailureKind,
        /// Human-readable cause.
        message: String,
    },
}

impl StreamObserver for mpsc::UnboundedSender<StreamEvent> {
    fn on_snapshot(&mut self, snapshot: &ResultSet) {
        let _ = self.send(StreamEvent::Snapshot(snapshot.clone()));
    }

    fn on_complete(&mut self) {
        let _ = self.send(StreamEvent::Completed);
    }

    fn on_failure(&mut self, error: &StreamError) {
        let _ = self.send(StreamEvent::Failed {
            kind: FailureKind::from(error),
            message: error.to_string(),
        });
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }

    fn closed(&self) -> BoxFuture<'_, ()> {
        mpsc::UnboundedSender::closed(self).boxed()
    }
}

/// Latest-state consumers only see snapshots.
impl StreamObserver for watch::Sender<Option<ResultSet>> {
    fn on_snapshot(&mut self, snapshot: &ResultSet) {
        self.send_replace(Some(snapshot.clone()));
    }

    fn on_complete(&mut self) {}

    fn on_failure(&mut self, _error: &StreamError) {}

    fn is_closed(&self) -> bool {
        watch::Sender::is_closed(self)
    }

    fn closed(&self) -> BoxFuture<'_, ()> {
        watch::Sender::closed(self).boxed()
    }
}

/// How a stream that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The transport signalled end of body.
    Completed,
    /// The cancel handle fired or the observer closed.
    Cancelled,
}

/// Final state of a stream that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    /// Why reading stopped.
    pub end: StreamEnd,
    /// Last published snapshot; `None` when no record was published.
    pub snapshot: Option<ResultSet>,
    /// Counters.
    pub stats: StreamStats,
}

/// Reads `body` to the end, publishing each new snapshot to `observer`.
///
/// The only await point is the next chunk; each chunk is decoded, split and
/// aggregated to completion before the next read. On failure `observer.on_failure`
/// is called and the error returned. On cancellation the body is dropped without
/// further reads and the observer hears nothing more. An observer whose consumer
/// went away counts as cancelled, even while the body is idle.
pub async fn consume<S, B, E, O>(
    body: S,
    mut aggregator: Aggregator,
    observer: &mut O,
    cancel: &CancelHandle,
) -> Result<StreamSummary, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
    O: StreamObserver + ?Sized,
{
    pin_mut!(body);
    let mut lines = LineStream::new();
    let mut published: Option<ResultSet> = None;
    let mut chunks = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = observer.closed() => None,
            next = body.next() => Some(next),
        };
        let next = match next {
            Some(next) if !stopped(cancel, &*observer) => next,
            _ => return Ok(cancelled(aggregator, published, chunks, lines.buffered_len())),
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                let err: StreamError = err.into();
                warn!(error = %err, chunks, "analysis stream failed");
                observer.on_failure(&err);
                return Err(err);
            }
            None => break,
        };
        chunks += 1;
        let bytes = chunk.as_ref();
        debug!(chunk = chunks, bytes = bytes.len(), "received chunk");

        for line in lines.write(bytes) {
            match aggregator.ingest_line(&line) {
                Ok(LineOutcome::Published(snapshot)) => {
                    if stopped(cancel, &*observer) {
                        return Ok(cancelled(aggregator, published, chunks, lines.buffered_len()));
                    }
                    observer.on_snapshot(&snapshot);
                    published = Some(snapshot);
                }
                Ok(_) => {}
                Err(err) => {
                    let err = StreamError::from(err);
                    warn!(error = %err, "aborting stream on malformed payload");
                    observer.on_failure(&err);
                    return Err(err);
                }
            }
        }
    }

    if let Some(residual) = lines.finish() {
        aggregator.note_residual(&residual);
    }
    if stopped(cancel, &*observer) {
        return Ok(cancelled(aggregator, published, chunks, 0));
    }

    let (snapshot, stats) = aggregator.finish();
    info!(
        chunks,
        products = snapshot.as_ref().map_or(0, ResultSet::len),
        malformed = stats.malformed,
        duplicates = stats.duplicates,
        "analysis stream complete"
    );
    observer.on_complete();
    Ok(StreamSummary {
        end: StreamEnd::Completed,
        snapshot,
        stats,
    })
}

/// Checked again right before every callback.
fn stopped<O: StreamObserver + ?Sized>(cancel: &CancelHandle, observer: &O) -> bool {
    cancel.is_cancelled() || observer.is_closed()
}

/// The aggregator may hold a record that was parsed but never published; the
/// summary reports the last snapshot the observer actually saw.
fn cancelled(
    aggregator: Aggregator,
    published: Option<ResultSet>,
    chunks: u64,
    buffered: usize,
) -> StreamSummary {
    let (_, stats) = aggregator.finish();
    info!(chunks, buffered, "analysis stream cancelled");
    StreamSummary {
        end: StreamEnd::Cancelled,
        snapshot: published,
        stats,
    }
}
